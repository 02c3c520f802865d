//! # genmedia server
//!
//! Upstream HTTP client plus the two ways of exposing the MCP server: a
//! stdio loop for agent hosts and a localhost HTTP endpoint.
//! This library is used by both the binary and integration tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;

use axum::{routing::get, routing::post, Router};
use genmedia_mcp::GenMediaMcpServer;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub mod client;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod stdio;

pub use client::{parse_retry_after, MediaApiClient, RetryConfig};

/// Shared application state for HTTP mode.
#[derive(Clone)]
pub struct AppState {
    /// MCP server instance.
    pub mcp: Arc<GenMediaMcpServer>,
    /// Whether an API key was configured at startup.
    pub api_key_configured: bool,
}

impl AppState {
    /// Create state around a server.
    #[must_use]
    pub fn new(mcp: Arc<GenMediaMcpServer>, api_key_configured: bool) -> Self {
        Self {
            mcp,
            api_key_configured,
        }
    }
}

/// Build the HTTP-mode router.
///
/// `/metrics` is only mounted when a Prometheus handle is supplied.
pub fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let mut app = Router::new()
        .route("/mcp", post(routes::mcp_handler))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/health", get(health::readiness))
        .with_state(state);

    if let Some(handle) = metrics_handle {
        let metrics_router = Router::new()
            .route("/metrics", get(routes::metrics_handler))
            .with_state(handle);
        app = app.merge(metrics_router);
    }

    app.layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
