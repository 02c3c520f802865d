//! HTTP client for the upstream generation API.
//!
//! Every call goes through one retry loop: transient statuses and connection
//! failures are retried with exponential backoff and jitter, `429` honours
//! `Retry-After`, and every outcome is normalised into a
//! [`ResponseEnvelope`] or a typed [`MediaError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use genmedia_core::error::is_retryable_status;
use genmedia_core::redact::{redact_json, redact_str};
use genmedia_core::{
    Credits, MediaError, MediaResult, MediaTransport, Method, RequestOptions, ResponseEnvelope,
    Settings,
};
use mime_guess::mime::{self, Mime};
use rand::Rng;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::metrics;

/// Header carrying the credits a call consumed.
pub const CREDITS_CONSUMED_HEADER: &str = "x-credits-consumed";
/// Header carrying the remaining account balance.
pub const CREDITS_REMAINING_HEADER: &str = "x-remaining-credits";
/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Longest upstream body quoted in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Configuration for retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Upper bound of the random extra delay, as a fraction of the base delay.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64, jitter: f64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            jitter,
        }
    }

    /// Delay before retry `attempt` (0-indexed) without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> u64 {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Delay before retry `attempt` (0-indexed), with jitter.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let base = self.base_delay(attempt);
        let spread = (base as f64 * self.jitter.clamp(0.0, 1.0)).floor() as u64;
        if spread == 0 {
            return base;
        }
        base.saturating_add(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Parse a `Retry-After` value given in seconds (integer or fractional).
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

/// Outcome of one HTTP attempt.
enum Attempt {
    Done(MediaResult<ResponseEnvelope>),
    Retry {
        error: MediaError,
        delay: Option<Duration>,
    },
}

/// Asynchronous client for the generation API.
#[derive(Clone)]
pub struct MediaApiClient {
    inner: Arc<InnerClient>,
}

struct InnerClient {
    http: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    retry_config: RetryConfig,
    default_timeout: Duration,
}

impl MediaApiClient {
    /// Create a client from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Configuration`] if the HTTP client fails to build.
    pub fn new(settings: &Settings) -> MediaResult<Self> {
        let retry_config = RetryConfig {
            max_retries: settings.max_retries,
            ..RetryConfig::default()
        };
        Self::with_retry_config(
            settings.base_url.clone(),
            settings.api_key.clone(),
            retry_config,
            settings.request_timeout,
        )
    }

    /// Create a client with an explicit retry configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Configuration`] if the HTTP client fails to build.
    pub fn with_retry_config(
        base_url: Url,
        api_key: Option<SecretString>,
        retry_config: RetryConfig,
        default_timeout: Duration,
    ) -> MediaResult<Self> {
        let http = Client::builder()
            .user_agent(format!("genmedia-mcp/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MediaError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(InnerClient {
                http,
                base_url,
                api_key,
                retry_config,
                default_timeout,
            }),
        })
    }

    /// The configured API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Whether a credential is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.inner.api_key.is_some()
    }

    fn url_for(&self, endpoint: &str) -> MediaResult<Url> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(|e| {
            MediaError::Configuration(format!("invalid endpoint {endpoint}: {e}"))
        })
    }

    /// Execute one logical call, retrying transient failures.
    ///
    /// # Errors
    ///
    /// See the module docs for the status-to-error mapping.
    #[tracing::instrument(
        name = "upstream_request",
        skip(self, options),
        fields(method = ?options.method)
    )]
    pub async fn execute(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> MediaResult<ResponseEnvelope> {
        let Some(api_key) = self.inner.api_key.as_ref() else {
            return Err(MediaError::Authentication(
                "No API key configured. Set GENMEDIA_API_KEY.".to_string(),
            ));
        };
        let url = self.url_for(endpoint)?;
        if let Some(body) = &options.body {
            debug!(%url, body = %redact_json(body), "upstream request");
        }

        match options.deadline {
            Some(deadline) => tokio::time::timeout(
                deadline,
                self.retry_loop(&url, api_key, &options),
            )
            .await
            .map_err(|_| {
                MediaError::Timeout(format!(
                    "{}: no result within {}s",
                    options.expect.failure_label(),
                    deadline.as_secs()
                ))
            })?,
            None => self.retry_loop(&url, api_key, &options).await,
        }
    }

    async fn retry_loop(
        &self,
        url: &Url,
        api_key: &SecretString,
        options: &RequestOptions,
    ) -> MediaResult<ResponseEnvelope> {
        let config = &self.inner.retry_config;
        let max_retries = options.max_retries.unwrap_or(config.max_retries);
        let timeout = options.timeout.unwrap_or(self.inner.default_timeout);

        let mut attempt = 0;
        loop {
            match self.attempt(url, api_key, options, timeout).await {
                Attempt::Done(result) => return result,
                Attempt::Retry { error, delay } => {
                    if attempt >= max_retries {
                        return Err(error);
                    }
                    let delay = delay.unwrap_or_else(|| {
                        Duration::from_millis(config.delay_for_attempt(attempt))
                    });
                    warn!(
                        "request to {} failed (attempt {}/{}), retrying in {}ms: {}",
                        url.path(),
                        attempt + 1,
                        max_retries + 1,
                        delay.as_millis(),
                        error
                    );
                    metrics::record_upstream_retry(error.kind().as_str());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        api_key: &SecretString,
        options: &RequestOptions,
        timeout: Duration,
    ) -> Attempt {
        let method = match options.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut request = self
            .inner
            .http
            .request(method, url.clone())
            .header(API_KEY_HEADER, api_key.expose_secret())
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let label = options.expect.failure_label();
        match tokio::time::timeout(timeout, exchange).await {
            Err(_) => {
                metrics::record_upstream_request("timeout");
                Attempt::Done(Err(MediaError::Timeout(format!(
                    "{label}: no response within {}s",
                    timeout.as_secs()
                ))))
            }
            Ok(Err(e)) if e.is_timeout() => {
                metrics::record_upstream_request("timeout");
                Attempt::Done(Err(MediaError::Timeout(format!("{label}: {e}"))))
            }
            Ok(Err(e)) => {
                metrics::record_upstream_request("network");
                Attempt::Retry {
                    error: MediaError::Network(format!("{label}: network error: {e}")),
                    delay: None,
                }
            }
            Ok(Ok((status, headers, body))) => {
                metrics::record_upstream_request(&status.to_string());
                classify_response(status, &headers, &body, label)
            }
        }
    }
}

impl std::fmt::Debug for MediaApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("has_api_key", &self.inner.api_key.is_some())
            .field("retry_config", &self.inner.retry_config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MediaTransport for MediaApiClient {
    async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> MediaResult<ResponseEnvelope> {
        self.execute(endpoint, options).await
    }
}

fn classify_response(status: u16, headers: &HeaderMap, body: &[u8], label: &str) -> Attempt {
    match status {
        200..=299 => Attempt::Done(decode_success(headers, body, label)),
        401 | 403 => Attempt::Done(Err(MediaError::Authentication(format!(
            "{label}: invalid or unauthorised API key ({status})"
        )))),
        402 => Attempt::Done(Err(MediaError::InsufficientCredits(format!(
            "{label}: insufficient credits ({status}): {}",
            error_text(body)
        )))),
        406 if json_error_field(body).is_some_and(|e| e.to_lowercase().contains("credit")) =>
        {
            Attempt::Done(Err(MediaError::InsufficientCredits(format!(
                "{label}: {}",
                error_text(body)
            ))))
        }
        429 => {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            Attempt::Retry {
                error: MediaError::RateLimit {
                    message: format!("{label}: rate limit exceeded ({status})"),
                    retry_after,
                },
                delay: retry_after,
            }
        }
        _ => {
            let error = MediaError::Generation {
                message: format!("{label} ({status}): {}", error_text(body)),
                status: Some(status),
                details: serde_json::from_slice(body).ok(),
            };
            if is_retryable_status(status) {
                Attempt::Retry { error, delay: None }
            } else {
                Attempt::Done(Err(error))
            }
        }
    }
}

/// The JSON `error` field of a body, either a string or an object's `message`.
fn json_error_field(body: &[u8]) -> Option<String> {
    let json = serde_json::from_slice::<Value>(body).ok()?;
    let error = json.get("error")?;
    error
        .as_str()
        .or_else(|| error.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

/// Human-readable text for an error body: its `error`/`message` field when it
/// is JSON, otherwise the truncated, redacted body.
fn error_text(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        let field = json
            .get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(Value::as_str)))
            .or_else(|| json.get("message").and_then(Value::as_str));
        if let Some(text) = field {
            return text.to_string();
        }
    }
    let text = String::from_utf8_lossy(body);
    let truncated: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
    redact_str(truncated.trim())
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn header_credits(headers: &HeaderMap) -> Option<Credits> {
    let credits = Credits {
        used: header_f64(headers, CREDITS_CONSUMED_HEADER),
        remaining: header_f64(headers, CREDITS_REMAINING_HEADER),
    };
    (credits.used.is_some() || credits.remaining.is_some()).then_some(credits)
}

fn decode_success(headers: &HeaderMap, body: &[u8], label: &str) -> MediaResult<ResponseEnvelope> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let Ok(parsed) = content_type.parse::<Mime>() else {
        return Err(unexpected_type(content_type, label));
    };

    let kind = parsed.type_();
    if kind == mime::IMAGE || kind == mime::VIDEO || kind == mime::AUDIO {
        let mut data = Map::new();
        data.insert(kind.as_str().to_string(), Value::from(STANDARD.encode(body)));
        data.insert("format".into(), Value::from(parsed.subtype().as_str()));
        data.insert("size".into(), Value::from(body.len()));
        data.insert("mimeType".into(), Value::from(parsed.essence_str()));
        let mut envelope = ResponseEnvelope::with_data(Value::Object(data));
        envelope.credits = header_credits(headers);
        return Ok(envelope);
    }

    if parsed.subtype() == mime::JSON || parsed.suffix() == Some(mime::JSON) {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            MediaError::generation(format!("{label}: response is not valid JSON: {e}"))
        })?;
        let mut envelope = ResponseEnvelope::from_json(value);
        if envelope.credits.is_none() {
            envelope.credits = header_credits(headers);
        }
        return envelope.into_result();
    }

    Err(unexpected_type(content_type, label))
}

fn unexpected_type(content_type: &str, label: &str) -> MediaError {
    let shown = if content_type.is_empty() {
        "none"
    } else {
        content_type
    };
    MediaError::generation(format!("{label}: Unexpected response type: {shown}"))
}
