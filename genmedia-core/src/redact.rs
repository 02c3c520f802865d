//! Log redaction.
//!
//! Request bodies and upstream error payloads are logged at debug level; these
//! helpers strip credentials and elide large base64 blobs first.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Replacement marker for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Strings longer than this are elided in logged JSON.
const MAX_LOGGED_STRING: usize = 256;

const SENSITIVE_KEYS: [&str; 9] = [
    "api_key",
    "apikey",
    "x-api-key",
    "authorization",
    "token",
    "secret",
    "password",
    "credential",
    "cookie",
];

static CREDENTIAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(bearer)\s+[A-Za-z0-9._~+/=-]{8,}",
        r"(?i)\b(api[_-]?key|x-api-key|token|secret|password)(\s*[:=]\s*)[^\s,;&]+",
        r"\bSG_[A-Za-z0-9]{8,}\b",
        r"\bsk-[A-Za-z0-9_-]{16,}\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Whether a JSON key names a sensitive field.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

/// Redact credential-shaped substrings.
#[must_use]
pub fn redact_str(input: &str) -> String {
    let mut output = input.to_string();
    for (index, pattern) in CREDENTIAL_PATTERNS.iter().enumerate() {
        let replacement = match index {
            0 => format!("$1 {REDACTED}"),
            1 => format!("$1$2{REDACTED}"),
            _ => REDACTED.to_string(),
        };
        output = pattern
            .replace_all(&output, replacement.as_str())
            .into_owned();
    }
    output
}

/// Copy of `value` safe to log: sensitive keys masked, credentials redacted,
/// long strings elided.
#[must_use]
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_json(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        Value::String(s) if s.len() > MAX_LOGGED_STRING => {
            Value::String(format!("<{} bytes elided>", s.len()))
        }
        Value::String(s) => Value::String(redact_str(s)),
        other => other.clone(),
    }
}
