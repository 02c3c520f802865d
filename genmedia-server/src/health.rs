//! Health check endpoints for HTTP mode.
//!
//! - `/health/live` - the process is up
//! - `/health/ready` - the catalog is loaded and a credential is configured
//! - `/health` - same as readiness

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: &'static str,
    /// Server version
    pub version: &'static str,
    /// Individual component checks
    pub checks: HealthChecks,
}

/// Individual health checks.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Model catalog has at least one entry
    pub catalog: bool,
    /// Number of catalog models
    pub models: usize,
    /// An API key is configured
    pub api_key: bool,
}

impl HealthStatus {
    /// Evaluate the checks against the current state.
    #[must_use]
    pub fn evaluate(state: &AppState) -> Self {
        let models = state.mcp.context().catalog.len();
        let checks = HealthChecks {
            catalog: models > 0,
            models,
            api_key: state.api_key_configured,
        };
        let healthy = checks.catalog && checks.api_key;
        Self {
            status: if healthy { "healthy" } else { "unhealthy" },
            version: env!("CARGO_PKG_VERSION"),
            checks,
        }
    }

    /// Whether every check passed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Liveness probe.
#[tracing::instrument(name = "liveness_probe")]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe.
///
/// Returns 503 while the server cannot serve generation calls.
#[tracing::instrument(name = "readiness_probe", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let status = HealthStatus::evaluate(&state);
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}
