//! Prometheus metrics for the genmedia server.
//!
//! Counters are recorded in both modes; the `/metrics` endpoint is only
//! served in HTTP mode.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

const HTTP_REQUESTS_TOTAL: &str = "genmedia_http_requests_total";
const HTTP_REQUEST_DURATION: &str = "genmedia_http_request_duration_seconds";
const TOOL_CALLS_TOTAL: &str = "genmedia_tool_calls_total";
const UPSTREAM_REQUESTS_TOTAL: &str = "genmedia_upstream_requests_total";
const UPSTREAM_RETRIES_TOTAL: &str = "genmedia_upstream_retries_total";
const STDIO_IN_FLIGHT: &str = "genmedia_stdio_requests_in_flight";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a request to the local HTTP endpoint.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        HTTP_REQUEST_DURATION,
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

/// Record a finished tool call.
///
/// # Arguments
///
/// * `tool_name` - Name of the tool called
/// * `success` - Whether the result was not an error result
pub fn record_tool_call(tool_name: &str, success: bool) {
    counter!(
        TOOL_CALLS_TOTAL,
        "tool" => tool_name.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

/// Record one upstream HTTP attempt.
///
/// `outcome` is the status code, or `network`/`timeout` when no response
/// arrived.
pub fn record_upstream_request(outcome: &str) {
    counter!(
        UPSTREAM_REQUESTS_TOTAL,
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an upstream retry, labelled by the error kind that caused it.
pub fn record_upstream_retry(reason: &str) {
    counter!(
        UPSTREAM_RETRIES_TOTAL,
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Increment in-flight stdio requests.
pub fn inc_stdio_in_flight() {
    gauge!(STDIO_IN_FLIGHT).increment(1.0);
}

/// Decrement in-flight stdio requests.
pub fn dec_stdio_in_flight() {
    gauge!(STDIO_IN_FLIGHT).decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        record_tool_call("generate_image", true);
        record_upstream_request("503");
        record_upstream_retry("rate_limit");
        record_http_request("POST", "/mcp", 200, 0.01);
        inc_stdio_in_flight();
        dec_stdio_in_flight();
    }
}
