//! Error taxonomy for media generation.
//!
//! Every failure that reaches a tool caller passes through
//! [`map_to_safe_error`], which turns arbitrary errors into a [`SafeError`]
//! carrying a presentable message, a closed [`ErrorKind`] and an HTTP status
//! equivalent.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Typed failures raised by the mediation layer.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Missing, invalid or rejected API credential.
    #[error("{0}")]
    Authentication(String),

    /// Upstream throttling that outlasted the retry budget.
    #[error("{message}")]
    RateLimit {
        /// Human readable message.
        message: String,
        /// Last `Retry-After` hint seen, if any.
        retry_after: Option<Duration>,
    },

    /// Billing-related rejection.
    #[error("{0}")]
    InsufficientCredits(String),

    /// Connection-level failure.
    #[error("{0}")]
    Network(String),

    /// Request or polling deadline exceeded.
    #[error("{0}")]
    Timeout(String),

    /// Invalid startup settings.
    #[error("{0}")]
    Configuration(String),

    /// Unknown model id.
    #[error("{0}")]
    ModelNotFound(String),

    /// Opaque upstream failure, surfaced with its original message.
    #[error("{message}")]
    Generation {
        /// Message shown to the caller.
        message: String,
        /// Upstream HTTP status, when the failure came from an HTTP response.
        status: Option<u16>,
        /// Raw upstream payload, only exposed in debug mode.
        details: Option<serde_json::Value>,
    },

    /// Tool argument or mapped parameter validation failure.
    #[error("{0}")]
    InvalidInput(String),
}

impl MediaError {
    /// Shorthand for a [`MediaError::Generation`] without upstream status.
    #[must_use]
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// The taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::InsufficientCredits(_) => ErrorKind::InsufficientCredits,
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ModelNotFound(_) => ErrorKind::ModelNotFound,
            Self::Generation { .. } => ErrorKind::Generation,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Returns true for failures worth repeating later (used by job polling).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Generation {
                status: Some(status),
                ..
            } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Convert into the caller-facing representation.
    #[must_use]
    pub fn to_safe(&self, debug: bool) -> SafeError {
        let details = match self {
            Self::Generation { details, .. } if debug => details.clone(),
            Self::RateLimit {
                retry_after: Some(delay),
                ..
            } if debug => Some(serde_json::json!({ "retry_after_ms": delay.as_millis() })),
            _ => None,
        };
        SafeError {
            user_message: self.to_string(),
            kind: self.kind(),
            status: self.kind().status_equivalent(),
            details,
        }
    }
}

/// HTTP statuses retried by the transport client.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Whether an HTTP status is in the retryable set.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Closed set of error kinds visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential problem.
    Authentication,
    /// Upstream throttling.
    RateLimit,
    /// Billing rejection.
    InsufficientCredits,
    /// Connection failure.
    Network,
    /// Deadline exceeded.
    Timeout,
    /// Invalid settings.
    Configuration,
    /// Unknown model.
    ModelNotFound,
    /// Upstream generation failure.
    Generation,
    /// Invalid arguments.
    InvalidInput,
    /// Anything not recognised by the mapper.
    Internal,
}

impl ErrorKind {
    /// HTTP status equivalent used in error results.
    #[must_use]
    pub fn status_equivalent(self) -> u16 {
        match self {
            Self::Authentication => 401,
            Self::RateLimit => 429,
            Self::InsufficientCredits => 402,
            Self::Network => 503,
            Self::Timeout => 504,
            Self::Configuration | Self::Internal => 500,
            Self::ModelNotFound => 404,
            Self::Generation => 502,
            Self::InvalidInput => 400,
        }
    }

    /// Stable label used in messages and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication_error",
            Self::RateLimit => "rate_limit_error",
            Self::InsufficientCredits => "insufficient_credits",
            Self::Network => "network_error",
            Self::Timeout => "timeout_error",
            Self::Configuration => "configuration_error",
            Self::ModelNotFound => "model_not_found",
            Self::Generation => "generation_error",
            Self::InvalidInput => "invalid_input",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, user-presentable error stripped of internal detail.
#[derive(Debug, Clone, Serialize)]
pub struct SafeError {
    /// Message shown to the caller.
    pub user_message: String,
    /// Taxonomy kind.
    pub kind: ErrorKind,
    /// HTTP status equivalent.
    pub status: u16,
    /// Extra diagnostics (debug mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl fmt::Display for SafeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error ({}): {}", self.kind, self.user_message)
    }
}

/// Map any failure into a [`SafeError`].
///
/// Typed [`MediaError`]s anywhere in the cause chain pass through unchanged.
/// Everything else is classified by substrings of its lowercase message and
/// keeps the original text; unrecognised errors become [`ErrorKind::Internal`].
#[must_use]
pub fn map_to_safe_error(error: &anyhow::Error, debug: bool) -> SafeError {
    if let Some(media) = error.chain().find_map(|e| e.downcast_ref::<MediaError>()) {
        return media.to_safe(debug);
    }

    let message = format!("{error:#}");
    let kind = classify_message(&message.to_lowercase());
    SafeError {
        status: kind.status_equivalent(),
        user_message: message,
        kind,
        details: None,
    }
}

fn classify_message(lower: &str) -> ErrorKind {
    if lower.contains("api key") {
        ErrorKind::Authentication
    } else if lower.contains("rate limit") {
        ErrorKind::RateLimit
    } else if lower.contains("credits") {
        ErrorKind::InsufficientCredits
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ErrorKind::Timeout
    } else if lower.contains("network") || lower.contains("fetch") {
        ErrorKind::Network
    } else {
        ErrorKind::Internal
    }
}
