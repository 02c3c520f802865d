//! MCP tools for media generation.
//!
//! Each tool deserializes its arguments into a typed struct, validates them,
//! selects a model and hands off to [`crate::pipeline`]. Failures of any kind
//! are mapped through [`map_to_safe_error`] into an error result; they never
//! escape as JSON-RPC errors.

use std::time::Instant;

use async_trait::async_trait;
use genmedia_core::redact::redact_str;
use genmedia_core::{
    map_to_safe_error, Catalog, MediaError, MediaResult, ModelCategory, ModelDescriptor,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::ToolContext;
use crate::pipeline::ensure_category;
use crate::ToolResult;

pub mod enhance_image;
pub mod estimate_cost;
pub mod generate_audio;
pub mod generate_image;
pub mod generate_music;
pub mod generate_video;
pub mod list_models;
pub mod prepare_image;
pub mod transform_image;

/// Output formats accepted by the image generation tools.
pub const IMAGE_OUTPUT_FORMATS: [&str; 3] = ["png", "jpeg", "webp"];

/// A callable MCP tool.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Tool name.
    fn name(&self) -> &'static str;

    /// One-paragraph description shown to the caller.
    fn description(&self) -> &'static str;

    /// JSON Schema of the arguments object.
    fn input_schema(&self) -> Value;

    /// Run the tool.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult>;
}

/// MCP tool definition as listed by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// Input schema (JSON Schema).
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Quality tier shared by the image and video tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Cheapest, quickest model.
    Fast,
    /// Default trade-off.
    #[default]
    Balanced,
    /// Best available model.
    High,
}

/// The fixed set of tools.
pub struct ToolRegistry {
    tools: Vec<Box<dyn MediaTool>>,
}

impl ToolRegistry {
    /// All nine tools.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            tools: vec![
                Box::new(generate_image::GenerateImage),
                Box::new(transform_image::TransformImage),
                Box::new(enhance_image::EnhanceImage),
                Box::new(generate_video::GenerateVideo),
                Box::new(generate_audio::GenerateAudio),
                Box::new(generate_music::GenerateMusic),
                Box::new(estimate_cost::EstimateCost),
                Box::new(prepare_image::PrepareImage),
                Box::new(list_models::ListModels),
            ],
        }
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn MediaTool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(|tool| &**tool)
    }

    /// Definitions for `tools/list`.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Tool names in listing order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tools.iter().map(|tool| tool.name())
    }

    /// Call a tool. Returns `None` for unknown names; every other outcome,
    /// failures included, is a [`ToolResult`].
    pub async fn call(&self, name: &str, args: Value, ctx: &ToolContext) -> Option<ToolResult> {
        let tool = self.get(name)?;
        let started = Instant::now();
        tracing::debug!(tool = name, "tool call started");

        let result = match tool.execute(args, ctx).await {
            Ok(result) => result,
            Err(err) => {
                let safe = map_to_safe_error(&err, ctx.debug);
                tracing::warn!(
                    tool = name,
                    kind = %safe.kind,
                    "tool call failed: {}",
                    redact_str(&format!("{err:#}"))
                );
                ToolResult::error(&safe)
            }
        };

        tracing::debug!(
            tool = name,
            is_error = result.is_error,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "tool call finished"
        );
        Some(result)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Deserialize tool arguments; a missing arguments object reads as `{}`.
///
/// # Errors
///
/// Returns [`MediaError::InvalidInput`] with the serde message.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> MediaResult<T> {
    let args = if args.is_null() {
        Value::Object(Map::new())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| MediaError::InvalidInput(format!("Invalid arguments: {e}")))
}

/// Resolve the model for a call: the explicit id when given, otherwise the
/// heuristic default.
///
/// # Errors
///
/// Returns [`MediaError::ModelNotFound`] for unknown ids and
/// [`MediaError::InvalidInput`] for models from another category.
pub fn select_model<'c>(
    catalog: &'c Catalog,
    explicit: Option<&str>,
    category: ModelCategory,
    tool: &str,
    default_id: &str,
) -> MediaResult<&'c ModelDescriptor> {
    let model = catalog.require_model(explicit.unwrap_or(default_id))?;
    ensure_category(model, category, tool)?;
    tracing::debug!(tool, model = %model.id, explicit = explicit.is_some(), "model selected");
    Ok(model)
}

/// The object inside a `json!({...})` literal.
pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_lists_every_tool_once() {
        let registry = ToolRegistry::standard();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "generate_image",
                "transform_image",
                "enhance_image",
                "generate_video",
                "generate_audio",
                "generate_music",
                "estimate_cost",
                "prepare_image",
                "list_models",
            ]
        );
        for definition in registry.definitions() {
            assert_eq!(definition.input_schema["type"], "object", "{}", definition.name);
            assert!(!definition.description.is_empty());
        }
    }

    #[test]
    fn explicit_model_must_exist_and_match_category() {
        let catalog = Catalog::builtin().unwrap();
        let unknown = select_model(
            &catalog,
            Some("imaginary-v9"),
            ModelCategory::TextToImage,
            "generate_image",
            "sdxl",
        );
        assert!(matches!(unknown, Err(MediaError::ModelNotFound(_))));

        let wrong = select_model(
            &catalog,
            Some("dia"),
            ModelCategory::TextToImage,
            "generate_image",
            "sdxl",
        );
        assert!(matches!(wrong, Err(MediaError::InvalidInput(_))));

        let explicit = select_model(
            &catalog,
            Some("flux-1.1-pro"),
            ModelCategory::TextToImage,
            "generate_image",
            "sdxl",
        )
        .unwrap();
        assert_eq!(explicit.id, "flux-1.1-pro");
    }

    #[test]
    fn malformed_arguments_are_invalid_input() {
        #[derive(Debug, Deserialize)]
        struct Args {
            #[allow(dead_code)]
            prompt: String,
        }
        assert!(matches!(
            parse_args::<Args>(json!({"prompt": 7})),
            Err(MediaError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_args::<Args>(Value::Null),
            Err(MediaError::InvalidInput(msg)) if msg.contains("prompt")
        ));
    }
}
