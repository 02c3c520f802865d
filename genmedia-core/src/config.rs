//! Process settings.
//!
//! Raw values come from the environment or CLI (see the server binary) and are
//! validated once, eagerly, into an immutable [`Settings`]. Any failure is a
//! [`MediaError::Configuration`] and prevents startup.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Default upstream API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.segmind.com/v1";

/// Default per-call timeout ceiling in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default retry budget for transient upstream failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Unvalidated settings as collected from env/CLI.
#[derive(Debug, Default)]
pub struct RawSettings {
    /// API credential.
    pub api_key: Option<String>,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Log verbosity.
    pub log_level: Option<String>,
    /// Default directory for generated files.
    pub output_dir: Option<PathBuf>,
    /// Per-call timeout ceiling in seconds.
    pub timeout_secs: Option<u64>,
    /// Retry budget.
    pub max_retries: Option<u32>,
    /// Cost statistics file.
    pub cost_file: Option<PathBuf>,
    /// Include diagnostic details in error results.
    pub debug: bool,
}

/// Validated, immutable settings.
#[derive(Debug)]
pub struct Settings {
    /// API credential; absent means every upstream call fails fast.
    pub api_key: Option<SecretString>,
    /// Upstream API base URL.
    pub base_url: Url,
    /// Log verbosity.
    pub log_level: String,
    /// Default directory for generated files.
    pub output_dir: Option<PathBuf>,
    /// Per-call timeout ceiling.
    pub request_timeout: Duration,
    /// Retry budget.
    pub max_retries: u32,
    /// Cost statistics file.
    pub cost_file: Option<PathBuf>,
    /// Include diagnostic details in error results.
    pub debug: bool,
}

impl Settings {
    /// Validate raw settings.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Configuration`] describing every invalid value.
    pub fn from_raw(raw: RawSettings) -> MediaResult<Self> {
        let mut problems = Vec::new();

        let api_key = match raw.api_key.map(|k| k.trim().to_string()) {
            Some(key) if key.is_empty() => {
                problems.push("API key is set but empty".to_string());
                None
            }
            Some(key) if key.chars().any(char::is_whitespace) => {
                problems.push("API key must not contain whitespace".to_string());
                None
            }
            Some(key) => Some(SecretString::from(key)),
            None => None,
        };

        let base_url = raw.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let base_url = match Url::parse(base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            Ok(url) => {
                problems.push(format!(
                    "base URL must use http or https, got {}",
                    url.scheme()
                ));
                None
            }
            Err(e) => {
                problems.push(format!("invalid base URL {base_url}: {e}"));
                None
            }
        };

        let log_level = raw
            .log_level
            .map_or_else(|| "info".to_string(), |l| l.to_lowercase());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            problems.push(format!(
                "log level must be one of {}, got {log_level}",
                LOG_LEVELS.join(", ")
            ));
        }

        let timeout_secs = raw.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !(1..=3600).contains(&timeout_secs) {
            problems.push(format!(
                "timeout must be between 1 and 3600 seconds, got {timeout_secs}"
            ));
        }

        let max_retries = raw.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries > 10 {
            problems.push(format!("max retries must be at most 10, got {max_retries}"));
        }

        if let Some(dir) = &raw.output_dir {
            if dir.is_file() {
                problems.push(format!(
                    "output directory {} is an existing file",
                    dir.display()
                ));
            }
        }

        if let Some(file) = &raw.cost_file {
            if file.is_dir() {
                problems.push(format!("cost file {} is a directory", file.display()));
            }
        }

        match base_url {
            Some(base_url) if problems.is_empty() => Ok(Self {
                api_key,
                base_url,
                log_level,
                output_dir: raw.output_dir,
                request_timeout: Duration::from_secs(timeout_secs),
                max_retries,
                cost_file: raw.cost_file,
                debug: raw.debug,
            }),
            _ => Err(MediaError::Configuration(format!(
                "invalid configuration: {}",
                problems.join("; ")
            ))),
        }
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::from_raw(RawSettings::default()).expect("settings");
        assert_eq!(settings.base_url.as_str(), "https://api.segmind.com/v1");
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(settings.request_timeout, Duration::from_secs(300));
        assert!(!settings.has_api_key());
    }

    #[test]
    fn api_key_is_trimmed_and_hidden() {
        let settings = Settings::from_raw(RawSettings {
            api_key: Some("  SG_secret123  ".into()),
            ..RawSettings::default()
        })
        .expect("settings");
        assert!(settings.has_api_key());
        let debug = format!("{settings:?}");
        assert!(!debug.contains("SG_secret123"));
    }

    #[test]
    fn every_problem_is_reported() {
        let err = Settings::from_raw(RawSettings {
            api_key: Some("   ".into()),
            base_url: Some("ftp://example.com".into()),
            log_level: Some("loud".into()),
            timeout_secs: Some(0),
            max_retries: Some(99),
            ..RawSettings::default()
        })
        .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, MediaError::Configuration(_)));
        assert!(message.contains("empty"));
        assert!(message.contains("http or https"));
        assert!(message.contains("log level"));
        assert!(message.contains("timeout"));
        assert!(message.contains("max retries"));
    }

    #[test]
    fn output_dir_must_not_be_a_file() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let err = Settings::from_raw(RawSettings {
            output_dir: Some(file.path().to_path_buf()),
            ..RawSettings::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("existing file"));
    }
}
