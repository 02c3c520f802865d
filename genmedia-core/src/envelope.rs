//! Request options and the normalised response envelope.
//!
//! The upstream API signals failure by the presence of an `error` field, not by
//! a success flag, and some endpoints pair HTTP 200 with an error body. The
//! envelope keeps that convention: [`ResponseEnvelope::is_failure`] looks only at
//! `error`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MediaError, MediaResult};

/// HTTP method used for an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    #[default]
    Post,
}

/// Expected shape of a successful response, used to pick error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// JSON document.
    #[default]
    Json,
    /// Binary image.
    Image,
    /// Binary video.
    Video,
    /// Binary audio.
    Audio,
}

impl ResponseKind {
    /// Prefix used when a request of this kind fails.
    #[must_use]
    pub fn failure_label(self) -> &'static str {
        match self {
            Self::Json => "API request failed",
            Self::Image => "Image generation failed",
            Self::Video => "Video generation failed",
            Self::Audio => "Audio generation failed",
        }
    }
}

/// Per-call options for [`crate::MediaTransport::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,
    /// JSON body, serialised when present.
    pub body: Option<Value>,
    /// Extra headers.
    pub headers: HashMap<String, String>,
    /// Hard per-attempt timeout. `None` uses the client default.
    pub timeout: Option<Duration>,
    /// Overall deadline across all attempts and backoff sleeps.
    pub deadline: Option<Duration>,
    /// Retry budget override. `None` uses the client default.
    pub max_retries: Option<u32>,
    /// Response kind hint.
    pub expect: ResponseKind,
}

impl RequestOptions {
    /// `POST` with a JSON body.
    #[must_use]
    pub fn post(body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::default()
        }
    }

    /// Bodyless `GET`.
    #[must_use]
    pub fn get() -> Self {
        Self {
            method: Method::Get,
            ..Self::default()
        }
    }

    /// Set the response kind hint.
    #[must_use]
    pub fn expect(mut self, kind: ResponseKind) -> Self {
        self.expect = kind;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the overall deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Override the retry budget.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Credit counters reported by the upstream API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Credits {
    /// Credits consumed by this call.
    #[serde(default)]
    pub used: Option<f64>,
    /// Credits left on the account.
    #[serde(default)]
    pub remaining: Option<f64>,
}

/// Embedded error: either a plain string or `{message, code}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeError {
    /// Plain message.
    Message(String),
    /// Structured error.
    Detailed {
        /// Message text.
        message: String,
        /// Optional error code (string or number upstream).
        #[serde(default)]
        code: Option<Value>,
    },
}

impl EnvelopeError {
    /// The message text.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Message(message) | Self::Detailed { message, .. } => message,
        }
    }

    /// The error code rendered as a string, if any.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Detailed {
                code: Some(Value::String(code)),
                ..
            } => Some(code.clone()),
            Self::Detailed {
                code: Some(code), ..
            } if !code.is_null() => Some(code.to_string()),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(Self::Message(s.clone())),
            Value::Object(map) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| value.to_string(), str::to_string);
                Some(Self::Detailed {
                    message,
                    code: map.get("code").cloned(),
                })
            }
            Value::Bool(false) => None,
            other => Some(Self::Message(other.to_string())),
        }
    }
}

/// The normalised `{data, error, credits, metadata}` shape every transport
/// response is coerced into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    /// Credit counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<Credits>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ResponseEnvelope {
    /// Successful envelope around `data`.
    #[must_use]
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// Attach credit counters.
    #[must_use]
    pub fn with_credits(mut self, credits: Credits) -> Self {
        self.credits = Some(credits);
        self
    }

    /// Whether the envelope represents a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Normalise a parsed JSON body.
    ///
    /// Objects contribute their `error`, `credits`, `metadata` and `data` keys.
    /// When no `data` key exists the remaining top-level fields become the
    /// payload, so bare bodies like `{"image": "..."}` still land in `data`.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::with_data(value);
        };

        let error = map
            .remove("error")
            .as_ref()
            .and_then(EnvelopeError::from_value);
        // A bare number under `credits` is a balance payload, not a credit block.
        let credits = match map.get("credits") {
            Some(Value::Object(_)) => map
                .remove("credits")
                .and_then(|v| serde_json::from_value::<Credits>(v).ok()),
            _ => None,
        };
        let metadata = map.remove("metadata").filter(|v| !v.is_null());
        let data = match map.remove("data") {
            Some(Value::Null) => None,
            Some(data) => Some(data),
            None if map.is_empty() => None,
            None => Some(Value::Object(map)),
        };

        Self {
            data,
            error,
            credits,
            metadata,
        }
    }

    /// Turn a failure envelope into a typed error.
    ///
    /// Messages mentioning credits become
    /// [`MediaError::InsufficientCredits`]; everything else is a
    /// [`MediaError::Generation`] carrying the upstream code as details.
    ///
    /// # Errors
    ///
    /// Returns the error described above when `error` is present.
    pub fn into_result(self) -> MediaResult<Self> {
        let Some(error) = &self.error else {
            return Ok(self);
        };
        let message = error.message().to_string();
        if message.to_lowercase().contains("credit") {
            return Err(MediaError::InsufficientCredits(message));
        }
        Err(MediaError::Generation {
            details: error.code().map(|code| serde_json::json!({ "code": code })),
            message,
            status: None,
        })
    }

    /// Look up a string field inside `data`.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// `data` as an object, if it is one.
    #[must_use]
    pub fn data_object(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()?.as_object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_field_marks_failure() {
        let envelope = ResponseEnvelope::from_json(json!({
            "data": {"image": "abc"},
            "error": "Content policy violation"
        }));
        assert!(envelope.is_failure());
        assert_eq!(
            envelope.error.as_ref().map(EnvelopeError::message),
            Some("Content policy violation")
        );
    }

    #[test]
    fn structured_error_keeps_code() {
        let envelope = ResponseEnvelope::from_json(json!({
            "error": {"message": "Not enough credits", "code": 4021}
        }));
        let error = envelope.error.expect("error");
        assert_eq!(error.message(), "Not enough credits");
        assert_eq!(error.code().as_deref(), Some("4021"));
    }

    #[test]
    fn empty_or_null_error_is_not_failure() {
        for body in [json!({"error": null, "data": 1}), json!({"error": "", "data": 1})] {
            assert!(!ResponseEnvelope::from_json(body).is_failure());
        }
    }

    #[test]
    fn bare_body_becomes_data() {
        let envelope = ResponseEnvelope::from_json(json!({
            "image": "aGVsbG8=",
            "credits": {"used": 1.0, "remaining": 41.5}
        }));
        assert_eq!(envelope.data_str("image"), Some("aGVsbG8="));
        let credits = envelope.credits.expect("credits");
        assert_eq!(credits.used, Some(1.0));
        assert_eq!(credits.remaining, Some(41.5));
    }

    #[test]
    fn numeric_credits_stay_in_data() {
        let envelope = ResponseEnvelope::from_json(json!({"credits": 42.0}));
        assert!(envelope.credits.is_none());
        assert_eq!(envelope.data, Some(json!({"credits": 42.0})));
    }

    #[test]
    fn non_object_body_is_data() {
        let envelope = ResponseEnvelope::from_json(json!(["a", "b"]));
        assert_eq!(envelope.data, Some(json!(["a", "b"])));
        assert!(!envelope.is_failure());
    }

    #[test]
    fn failure_envelopes_become_typed_errors() {
        let credits = ResponseEnvelope::from_json(json!({"error": "Insufficient credits"}));
        assert!(matches!(
            credits.into_result(),
            Err(MediaError::InsufficientCredits(_))
        ));

        let generic = ResponseEnvelope::from_json(json!({
            "error": {"message": "NSFW content detected", "code": "nsfw"}
        }));
        match generic.into_result() {
            Err(MediaError::Generation { message, details, .. }) => {
                assert_eq!(message, "NSFW content detected");
                assert_eq!(details, Some(json!({"code": "nsfw"})));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let ok = ResponseEnvelope::with_data(json!({"image": "AAAA"}));
        assert!(ok.into_result().is_ok());
    }

    #[test]
    fn request_options_builder() {
        let options = RequestOptions::post(json!({"prompt": "x"}))
            .expect(ResponseKind::Image)
            .timeout(Duration::from_secs(30))
            .max_retries(1)
            .header("x-trace", "1");
        assert_eq!(options.method, Method::Post);
        assert_eq!(options.expect, ResponseKind::Image);
        assert_eq!(options.max_retries, Some(1));
        assert_eq!(options.headers.get("x-trace").map(String::as_str), Some("1"));
    }
}
