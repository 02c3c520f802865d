//! Polling for asynchronous generation jobs.
//!
//! Some video models answer a submission with a job id instead of a result.
//! The job is polled at a fixed interval until it completes, fails, or the
//! attempt budget runs out.

use std::time::Duration;

use genmedia_core::transport::JOB_STATUS_ENDPOINT;
use genmedia_core::{
    MediaError, MediaResult, MediaTransport, RequestOptions, ResponseEnvelope, ResponseKind,
};
use serde_json::Value;

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of polls before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 60;

/// Polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep before each poll.
    pub interval: Duration,
    /// Maximum number of polls.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// State reported by the job status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Result is ready.
    Completed,
    /// Job failed with a message.
    Failed(String),
    /// Still queued or running.
    Pending,
}

/// Job id from a submission response (`request_id`, `job_id` or `id`).
#[must_use]
pub fn job_id(envelope: &ResponseEnvelope) -> Option<String> {
    let data = envelope.data_object()?;
    ["request_id", "job_id", "id"]
        .iter()
        .find_map(|key| match data.get(*key)? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        })
}

/// Interpret a status response.
#[must_use]
pub fn job_status(envelope: &ResponseEnvelope) -> JobStatus {
    let Some(data) = envelope.data_object() else {
        return JobStatus::Pending;
    };
    let status = data
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();

    match status.as_str() {
        "completed" | "succeeded" | "success" => JobStatus::Completed,
        "failed" | "error" | "cancelled" | "canceled" => {
            let message = ["error", "message", "detail"]
                .iter()
                .find_map(|key| data.get(*key).and_then(Value::as_str))
                .unwrap_or("no reason given");
            JobStatus::Failed(message.to_string())
        }
        _ => JobStatus::Pending,
    }
}

/// Unwrap the result of a completed job: a nested `result`/`output` object
/// becomes the payload, otherwise the status document itself is used.
fn completed_payload(mut envelope: ResponseEnvelope) -> ResponseEnvelope {
    if let Some(Value::Object(mut data)) = envelope.data.take() {
        let nested = ["result", "output"]
            .into_iter()
            .find(|key| matches!(data.get(*key), Some(Value::Object(_))))
            .and_then(|key| data.remove(key));
        envelope.data = Some(nested.unwrap_or(Value::Object(data)));
    }
    envelope
}

/// Poll a job until it reaches a terminal state.
///
/// Transient errors are tolerated within the attempt budget; anything else
/// aborts immediately.
///
/// # Errors
///
/// Returns [`MediaError::Generation`] for failed jobs, the first
/// non-transient transport error, or [`MediaError::Timeout`] when the budget
/// is exhausted.
pub async fn await_job(
    transport: &dyn MediaTransport,
    job_id: &str,
    config: PollConfig,
    expect: ResponseKind,
) -> MediaResult<ResponseEnvelope> {
    let endpoint = format!("{JOB_STATUS_ENDPOINT}/{job_id}");

    for attempt in 1..=config.max_attempts {
        tokio::time::sleep(config.interval).await;

        match transport
            .request(&endpoint, RequestOptions::get().expect(expect).max_retries(0))
            .await
        {
            Ok(envelope) => match job_status(&envelope) {
                JobStatus::Completed => {
                    tracing::info!(job_id, attempt, "job completed");
                    return Ok(completed_payload(envelope));
                }
                JobStatus::Failed(reason) => {
                    return Err(MediaError::generation(format!("Job {job_id} failed: {reason}")));
                }
                JobStatus::Pending => {
                    tracing::debug!(job_id, attempt, "job still pending");
                }
            },
            Err(err) if err.is_transient() => {
                tracing::warn!(job_id, attempt, "transient error while polling: {err}");
            }
            Err(err) => return Err(err),
        }
    }

    Err(MediaError::Timeout(format!(
        "Job {job_id} did not complete after {} status checks",
        config.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedTransport {
        replies: Mutex<Vec<MediaResult<ResponseEnvelope>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(mut replies: Vec<MediaResult<ResponseEnvelope>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaTransport for ScriptedTransport {
        async fn request(
            &self,
            endpoint: &str,
            _options: RequestOptions,
        ) -> MediaResult<ResponseEnvelope> {
            self.calls.lock().unwrap().push(endpoint.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(ResponseEnvelope::with_data(json!({"status": "processing"}))))
        }
    }

    fn fast(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    fn status(body: serde_json::Value) -> MediaResult<ResponseEnvelope> {
        Ok(ResponseEnvelope::with_data(body))
    }

    #[test]
    fn job_ids_are_found_under_known_keys() {
        for body in [
            json!({"request_id": "abc"}),
            json!({"job_id": "abc"}),
            json!({"id": "abc"}),
        ] {
            assert_eq!(job_id(&ResponseEnvelope::with_data(body)).as_deref(), Some("abc"));
        }
        assert_eq!(
            job_id(&ResponseEnvelope::with_data(json!({"id": 42}))).as_deref(),
            Some("42")
        );
        assert!(job_id(&ResponseEnvelope::with_data(json!({"video": "AAAA"}))).is_none());
    }

    #[tokio::test]
    async fn polls_until_completed() {
        let transport = ScriptedTransport::new(vec![
            status(json!({"status": "queued"})),
            status(json!({"status": "processing"})),
            status(json!({"status": "COMPLETED", "output": {"video_url": "https://cdn/v.mp4"}})),
        ]);

        let envelope = await_job(&transport, "job-1", fast(10), ResponseKind::Video)
            .await
            .expect("completed");
        assert_eq!(envelope.data_str("video_url"), Some("https://cdn/v.mp4"));
        assert_eq!(transport.calls().len(), 3);
        assert_eq!(transport.calls()[0], "/requests/job-1");
    }

    #[tokio::test]
    async fn failed_job_is_a_generation_error() {
        let transport = ScriptedTransport::new(vec![status(
            json!({"status": "failed", "error": "content policy"}),
        )]);
        let err = await_job(&transport, "job-2", fast(10), ResponseKind::Video)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Generation { .. }));
        assert!(err.to_string().contains("content policy"));
    }

    #[tokio::test]
    async fn transient_errors_are_tolerated() {
        let transport = ScriptedTransport::new(vec![
            Err(MediaError::Network("connection reset".into())),
            status(json!({"status": "completed", "video": "AAAA"})),
        ]);
        let envelope = await_job(&transport, "job-3", fast(5), ResponseKind::Video)
            .await
            .expect("completed");
        assert_eq!(envelope.data_str("video"), Some("AAAA"));
    }

    #[tokio::test]
    async fn non_transient_errors_abort() {
        let transport = ScriptedTransport::new(vec![Err(MediaError::Authentication(
            "Invalid API key".into(),
        ))]);
        let err = await_job(&transport, "job-4", fast(5), ResponseKind::Video)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Authentication(_)));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_is_a_timeout() {
        let transport = ScriptedTransport::new(Vec::new());
        let err = await_job(&transport, "job-5", fast(3), ResponseKind::Video)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Timeout(_)));
        assert_eq!(transport.calls().len(), 3);
    }
}
