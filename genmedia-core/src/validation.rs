//! Input validation for tool arguments.
//!
//! All caller-supplied arguments are validated before any model is selected or
//! any request is made. Checks accumulate in a [`Validator`] so a single
//! response lists every problem.

use thiserror::Error;

use crate::error::{MediaError, MediaResult};

/// Maximum prompt length accepted by any tool.
pub const MAX_PROMPT_LEN: usize = 5000;
/// Maximum negative prompt length.
pub const MAX_NEGATIVE_PROMPT_LEN: usize = 1000;
/// Maximum length for model ids.
pub const MAX_MODEL_ID_LEN: usize = 64;
/// Largest seed value.
pub const MAX_SEED: u64 = 4_294_967_295;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Field name.
        field: &'static str,
    },
    /// A string exceeds its maximum length.
    #[error("{field} is too long ({len} chars, max {max})")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Actual length.
        len: usize,
        /// Maximum length.
        max: usize,
    },
    /// A number is outside its range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Inclusive minimum.
        min: f64,
        /// Inclusive maximum.
        max: f64,
        /// Supplied value.
        value: f64,
    },
    /// A value is not in its enumeration.
    #[error("{field} must be one of: {allowed}, got {value}")]
    NotAllowed {
        /// Field name.
        field: &'static str,
        /// Comma-separated options.
        allowed: String,
        /// Supplied value.
        value: String,
    },
    /// A model id contains invalid characters.
    #[error("model contains invalid characters")]
    ModelIdInvalidChars,
}

/// Accumulates validation failures.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    /// Start a new validation pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Required non-blank text of bounded length.
    pub fn text(&mut self, field: &'static str, value: &str, max: usize) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(ValidationError::Empty { field });
        } else {
            self.optional_text(field, Some(value), max);
        }
        self
    }

    /// Optional text of bounded length.
    pub fn optional_text(
        &mut self,
        field: &'static str,
        value: Option<&str>,
        max: usize,
    ) -> &mut Self {
        if let Some(value) = value {
            let len = value.chars().count();
            if len > max {
                self.errors
                    .push(ValidationError::TooLong { field, len, max });
            }
        }
        self
    }

    /// Optional number within an inclusive range.
    pub fn range<T>(
        &mut self,
        field: &'static str,
        value: Option<T>,
        min: f64,
        max: f64,
    ) -> &mut Self
    where
        T: Into<f64> + Copy,
    {
        if let Some(value) = value.map(Into::into) {
            if !value.is_finite() || value < min || value > max {
                self.errors.push(ValidationError::OutOfRange {
                    field,
                    min,
                    max,
                    value,
                });
            }
        }
        self
    }

    /// Optional seed.
    #[allow(clippy::cast_precision_loss)]
    pub fn seed(&mut self, value: Option<u64>) -> &mut Self {
        if let Some(seed) = value {
            if seed > MAX_SEED {
                self.errors.push(ValidationError::OutOfRange {
                    field: "seed",
                    min: 0.0,
                    max: MAX_SEED as f64,
                    value: seed as f64,
                });
            }
        }
        self
    }

    /// Optional value from a fixed set.
    pub fn choice(
        &mut self,
        field: &'static str,
        value: Option<&str>,
        allowed: &[&str],
    ) -> &mut Self {
        if let Some(value) = value {
            if !allowed.contains(&value) {
                self.errors.push(ValidationError::NotAllowed {
                    field,
                    allowed: allowed.join(", "),
                    value: value.to_string(),
                });
            }
        }
        self
    }

    /// Optional explicit model id.
    pub fn model_id(&mut self, value: Option<&str>) -> &mut Self {
        if let Some(id) = value {
            if id.is_empty() || id.len() > MAX_MODEL_ID_LEN {
                self.errors.push(ValidationError::TooLong {
                    field: "model",
                    len: id.len(),
                    max: MAX_MODEL_ID_LEN,
                });
            } else if !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                self.errors.push(ValidationError::ModelIdInvalidChars);
            }
        }
        self
    }

    /// Collected errors.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Finish the pass.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::InvalidInput`] listing every failure.
    pub fn finish(&self) -> MediaResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        Err(MediaError::InvalidInput(format!(
            "Invalid arguments: {}",
            messages.join("; ")
        )))
    }
}
