//! Static model catalog.
//!
//! Descriptors are loaded once from the embedded `models.json` table and never
//! mutated. Each descriptor carries a declarative alias table mapping uniform
//! tool argument names (`width`, `steps`, ...) onto the model's own parameter
//! names, and a capability set computed at load time so mapping is a plain
//! membership check.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MediaError, MediaResult};

const BUILTIN_MODELS: &str = include_str!("../models.json");

/// Model family, one per tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelCategory {
    /// Prompt to image.
    TextToImage,
    /// Image plus prompt to image.
    ImageToImage,
    /// Upscaling and restoration.
    ImageEnhance,
    /// Prompt (and optional frame) to video.
    Video,
    /// Text to speech.
    TextToSpeech,
    /// Prompt to music.
    Music,
}

impl ModelCategory {
    /// All categories in display order.
    pub const ALL: [Self; 6] = [
        Self::TextToImage,
        Self::ImageToImage,
        Self::ImageEnhance,
        Self::Video,
        Self::TextToSpeech,
        Self::Music,
    ];

    /// Wire name (`text-to-image`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToImage => "text-to-image",
            Self::ImageToImage => "image-to-image",
            Self::ImageEnhance => "image-enhance",
            Self::Video => "video",
            Self::TextToSpeech => "text-to-speech",
            Self::Music => "music",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Image bytes or URL.
    Image,
    /// Video bytes or URL.
    Video,
    /// Audio bytes or URL.
    Audio,
    /// Plain text.
    Text,
}

/// Declared type of one model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 string.
    String,
    /// Whole number.
    Integer,
    /// Any number.
    Number,
    /// Boolean flag.
    Boolean,
    /// Image reference: URL or base64 payload.
    Image,
}

/// Schema for one model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: ParamType,
    /// Whether the parameter must be present.
    #[serde(default)]
    pub required: bool,
    /// Inclusive lower bound for numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Allowed values.
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    /// Maximum string length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl ParamSpec {
    /// Check one value against this parameter, returning the reason on mismatch.
    fn check(&self, value: &Value) -> Result<(), String> {
        match self.kind {
            ParamType::String | ParamType::Image => {
                let Some(s) = value.as_str() else {
                    return Err("expected a string".to_string());
                };
                if self.kind == ParamType::Image && s.trim().is_empty() {
                    return Err("image reference is empty".to_string());
                }
                if let Some(max) = self.max_length {
                    let len = s.chars().count();
                    if len > max {
                        return Err(format!("length {len} exceeds maximum {max}"));
                    }
                }
            }
            ParamType::Integer => {
                let is_whole = value.as_i64().is_some()
                    || value.as_u64().is_some()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0);
                if !is_whole {
                    return Err("expected an integer".to_string());
                }
            }
            ParamType::Number => {
                if !value.is_number() {
                    return Err("expected a number".to_string());
                }
            }
            ParamType::Boolean => {
                if !value.is_boolean() {
                    return Err("expected a boolean".to_string());
                }
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(format!("{n} is below minimum {min}"));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(format!("{n} is above maximum {max}"));
                }
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|a| values_equal(a, value)) {
                let options: Vec<String> = allowed.iter().map(render_value).collect();
                return Err(format!("must be one of: {}", options.join(", ")));
            }
        }

        Ok(())
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn render_value(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}

/// Maximum output dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Static metadata describing one upstream generation model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model id, also the default endpoint suffix.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Model family.
    pub category: ModelCategory,
    /// Endpoint path relative to the API base URL.
    pub endpoint: String,
    /// Upstream API version.
    pub api_version: String,
    /// What the model produces.
    pub output_type: OutputType,
    /// Typical processing time.
    pub estimated_time_seconds: u64,
    /// Declared cost per call.
    pub credits_per_use: f64,
    /// Submission returns a job id that must be polled.
    #[serde(default)]
    pub async_job: bool,
    /// Parameter schema keyed by upstream parameter name.
    pub parameters: BTreeMap<String, ParamSpec>,
    /// Uniform argument name to upstream parameter name.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Defaults applied before explicit arguments.
    #[serde(default)]
    pub default_params: Map<String, Value>,
    /// Output formats the model can produce.
    #[serde(default)]
    pub supported_formats: Vec<String>,
    /// Maximum output size, for image and video models.
    #[serde(default)]
    pub max_dimensions: Option<Dimensions>,
    #[serde(skip)]
    capabilities: HashSet<String>,
}

impl ModelDescriptor {
    /// Whether the model accepts an upstream parameter with this name.
    #[must_use]
    pub fn supports(&self, param: &str) -> bool {
        self.capabilities.contains(param)
    }

    /// Upstream name for a uniform argument name.
    #[must_use]
    pub fn resolve_param<'a>(&'a self, uniform: &'a str) -> &'a str {
        self.aliases.get(uniform).map_or(uniform, String::as_str)
    }

    /// Map uniform arguments onto this model's parameters.
    ///
    /// Defaults form the base; explicit non-null arguments override them.
    /// Arguments the model does not support are dropped.
    #[must_use]
    pub fn map_parameters(&self, uniform: &Map<String, Value>) -> Map<String, Value> {
        let mut params = self.default_params.clone();
        for (key, value) in uniform {
            if value.is_null() {
                continue;
            }
            let target = self.resolve_param(key);
            if self.supports(target) {
                params.insert(target.to_string(), value.clone());
            } else {
                tracing::debug!(
                    model = %self.id,
                    argument = %key,
                    "argument not supported by model, dropped"
                );
            }
        }
        params
    }

    /// Check mapped parameters against the schema.
    #[must_use]
    pub fn check_parameters(&self, params: &Map<String, Value>) -> Vec<FieldError> {
        let mut errors = Vec::new();

        for (name, spec) in &self.parameters {
            if spec.required && params.get(name).map_or(true, Value::is_null) {
                errors.push(FieldError::new(name, "is required"));
            }
        }

        for (name, value) in params {
            match self.parameters.get(name) {
                None => errors.push(FieldError::new(name, "is not supported by this model")),
                Some(_) if value.is_null() => {}
                Some(spec) => {
                    if let Err(reason) = spec.check(value) {
                        errors.push(FieldError::new(name, reason));
                    }
                }
            }
        }

        errors
    }

    fn index_capabilities(&mut self) {
        self.capabilities = self.parameters.keys().cloned().collect();
    }

    fn integrity_errors(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (uniform, target) in &self.aliases {
            if !self.parameters.contains_key(target) {
                problems.push(format!(
                    "{}: alias {uniform} points at undeclared parameter {target}",
                    self.id
                ));
            }
        }
        for error in self.check_parameters(&self.default_params) {
            if error.reason != "is required" {
                problems.push(format!("{}: default {error}", self.id));
            }
        }
        problems
    }
}

/// One offending field in a parameter check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Parameter name.
    pub field: String,
    /// Why it was rejected.
    pub reason: String,
}

impl FieldError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.reason)
    }
}

/// Read-only index of model descriptors by id and by category.
#[derive(Debug, Clone)]
pub struct Catalog {
    models: Vec<ModelDescriptor>,
    by_id: HashMap<String, usize>,
    by_category: HashMap<ModelCategory, Vec<usize>>,
}

impl Catalog {
    /// Load the embedded model table.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Configuration`] if the table is malformed.
    pub fn builtin() -> MediaResult<Self> {
        Self::from_json(BUILTIN_MODELS)
    }

    /// Load a catalog from a JSON array of descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Configuration`] on parse failures, duplicate ids,
    /// dangling aliases or defaults that violate their own schema.
    pub fn from_json(json: &str) -> MediaResult<Self> {
        let models: Vec<ModelDescriptor> = serde_json::from_str(json)
            .map_err(|e| MediaError::Configuration(format!("invalid model catalog: {e}")))?;
        Self::from_descriptors(models)
    }

    /// Build the index from descriptors.
    ///
    /// # Errors
    ///
    /// See [`Catalog::from_json`].
    pub fn from_descriptors(mut models: Vec<ModelDescriptor>) -> MediaResult<Self> {
        let mut by_id = HashMap::new();
        let mut by_category: HashMap<ModelCategory, Vec<usize>> = HashMap::new();
        let mut problems = Vec::new();

        for (index, model) in models.iter_mut().enumerate() {
            model.index_capabilities();
            problems.extend(model.integrity_errors());
            if by_id.insert(model.id.clone(), index).is_some() {
                problems.push(format!("duplicate model id {}", model.id));
            }
            by_category.entry(model.category).or_default().push(index);
        }

        if !problems.is_empty() {
            return Err(MediaError::Configuration(format!(
                "invalid model catalog: {}",
                problems.join("; ")
            )));
        }

        tracing::debug!(models = models.len(), "model catalog loaded");
        Ok(Self {
            models,
            by_id,
            by_category,
        })
    }

    /// Look up a model by id.
    #[must_use]
    pub fn get_model(&self, id: &str) -> Option<&ModelDescriptor> {
        self.by_id.get(id).map(|&i| &self.models[i])
    }

    /// Look up a model, failing with [`MediaError::ModelNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::ModelNotFound`] for unknown ids.
    pub fn require_model(&self, id: &str) -> MediaResult<&ModelDescriptor> {
        self.get_model(id).ok_or_else(|| {
            MediaError::ModelNotFound(format!(
                "Model not found: {id}. Use list_models to see available models."
            ))
        })
    }

    /// Models in a category, in table order.
    #[must_use]
    pub fn models_by_category(&self, category: ModelCategory) -> Vec<&ModelDescriptor> {
        self.by_category
            .get(&category)
            .map(|indices| indices.iter().map(|&i| &self.models[i]).collect())
            .unwrap_or_default()
    }

    /// All models in table order.
    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    /// Number of models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Validate mapped parameters for a model.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::ModelNotFound`] for unknown ids and
    /// [`MediaError::InvalidInput`] naming every offending field.
    pub fn validate_parameters(&self, id: &str, params: &Map<String, Value>) -> MediaResult<()> {
        let model = self.require_model(id)?;
        let errors = model.check_parameters(params);
        if errors.is_empty() {
            return Ok(());
        }
        let fields: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Err(MediaError::InvalidInput(format!(
            "Invalid parameters for {}: {}",
            model.id,
            fields.join("; ")
        )))
    }
}
