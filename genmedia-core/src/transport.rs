//! The seam between tool handlers and the upstream HTTP API.

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::{Credits, RequestOptions, ResponseEnvelope, ResponseKind};
use crate::error::MediaResult;

/// Endpoint returning the account's credit balance.
pub const CREDITS_ENDPOINT: &str = "/credits";

/// Endpoint prefix for asynchronous job status, followed by `/{job_id}`.
pub const JOB_STATUS_ENDPOINT: &str = "/requests";

/// Model ids served from historical endpoint paths.
const LEGACY_IMAGE_ENDPOINTS: [(&str, &str); 3] = [
    ("sdxl", "/sdxl1.0-txt2img"),
    ("sdxl-img2img", "/sdxl1.0-img2img"),
    ("flux-schnell", "/fast-flux-schnell"),
];

/// Endpoint path for an image model id.
#[must_use]
pub fn image_endpoint(model_id: &str) -> String {
    LEGACY_IMAGE_ENDPOINTS
        .iter()
        .find(|(id, _)| *id == model_id)
        .map_or_else(|| format!("/{model_id}"), |(_, path)| (*path).to_string())
}

/// Executes logical API calls against the generation service.
///
/// Implemented over HTTP by the server crate and by in-memory fakes in tests.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Execute one call, retrying transient failures.
    async fn request(&self, endpoint: &str, options: RequestOptions)
        -> MediaResult<ResponseEnvelope>;

    /// Generate an image, resolving the model's historical endpoint path.
    async fn generate_image(
        &self,
        model_id: &str,
        params: Value,
        options: RequestOptions,
    ) -> MediaResult<ResponseEnvelope> {
        let options = RequestOptions {
            body: Some(params),
            ..options
        }
        .expect(ResponseKind::Image);
        self.request(&image_endpoint(model_id), options).await
    }

    /// Fetch the live credit balance.
    async fn credit_balance(&self) -> MediaResult<Credits> {
        let envelope = self
            .request(CREDITS_ENDPOINT, RequestOptions::get().max_retries(1))
            .await?;
        Ok(credits_from_envelope(&envelope))
    }
}

/// Extract a balance from either the credit block or the payload.
#[must_use]
pub fn credits_from_envelope(envelope: &ResponseEnvelope) -> Credits {
    let mut credits = envelope.credits.unwrap_or_default();
    if credits.remaining.is_none() {
        credits.remaining = envelope.data.as_ref().and_then(|data| {
            ["remaining", "credits", "balance"]
                .iter()
                .find_map(|key| data.get(*key).and_then(Value::as_f64))
                .or_else(|| data.as_f64())
        });
    }
    credits
}
