//! Route handlers for HTTP mode.

use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::{metrics, AppState};

/// MCP JSON-RPC endpoint.
///
/// The body is handed to the same dispatcher as stdio mode, so malformed
/// JSON gets a JSON-RPC parse error rather than an HTTP 4xx. Notifications
/// are acknowledged with `202 Accepted` and an empty body.
#[tracing::instrument(name = "mcp_handler", skip(state, body), fields(bytes = body.len()))]
pub async fn mcp_handler(State(state): State<AppState>, body: String) -> Response {
    let started = Instant::now();
    let response = match state.mcp.handle_json(&body).await {
        Some(reply) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            reply,
        )
            .into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    metrics::record_http_request(
        "POST",
        "/mcp",
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Prometheus metrics endpoint.
#[tracing::instrument(name = "metrics", skip(handle))]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
