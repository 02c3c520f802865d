//! # genmedia MCP
//!
//! MCP (Model Context Protocol) tools and resources for generative media.
//!
//! ## MCP Resources
//!
//! - `genmedia://models` - The full model catalog
//! - `genmedia://models/{category}` - Models in one category
//! - `genmedia://costs` - Observed cost statistics
//!
//! ## MCP Tools
//!
//! - `generate_image` - Text to image
//! - `transform_image` - Image plus prompt to image
//! - `enhance_image` - Upscale or restore faces
//! - `generate_video` - Text (and optional start frame) to video
//! - `generate_audio` - Text to speech
//! - `generate_music` - Prompt to music
//! - `estimate_cost` - Projected credit cost
//! - `prepare_image` - Cache a local image for later calls
//! - `list_models` - Browse the catalog

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod formatter;
pub mod image_input;
pub mod pipeline;
pub mod polling;
pub mod resources;
pub mod server;
pub mod tools;

// Re-export key types for convenience
pub use context::ToolContext;
pub use server::{GenMediaMcpServer, JsonRpcRequest, JsonRpcResponse};
pub use tools::{MediaTool, ToolRegistry};

use genmedia_core::SafeError;
use serde::{Deserialize, Serialize};

/// One MCP content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Inline base64 image.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ContentBlock {
    /// Text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Inline image block.
    #[must_use]
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// The text, for text blocks.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// MCP tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content blocks.
    pub content: Vec<ContentBlock>,
    /// Whether the call failed.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Create a success result.
    #[must_use]
    pub fn success(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Single text block success result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![ContentBlock::text(text)])
    }

    /// Create an error result from a mapped error.
    #[must_use]
    pub fn error(error: &SafeError) -> Self {
        let mut content = vec![ContentBlock::text(error.to_string())];
        if let Some(details) = &error.details {
            content.push(ContentBlock::text(format!(
                "Details: {}",
                serde_json::to_string_pretty(details).unwrap_or_default()
            )));
        }
        Self {
            content,
            is_error: true,
        }
    }

    /// All text blocks joined with newlines.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outcome of one generation tool call.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Blocks produced by the formatter, summary last.
    pub content: Vec<ContentBlock>,
    /// Model that served the call.
    pub model_id: String,
    /// Credits consumed across all units.
    pub credits_used: f64,
    /// Wall-clock time across all units.
    pub processing_time_ms: u64,
    /// Extra facts about the call (job ids, remaining credits).
    pub metadata: serde_json::Value,
}

impl From<GenerationResult> for ToolResult {
    fn from(result: GenerationResult) -> Self {
        Self::success(result.content)
    }
}

/// MCP resource content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum ResourceContent {
    /// Text content (UTF-8).
    Text(String),
    /// JSON content.
    Json(serde_json::Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmedia_core::MediaError;

    #[test]
    fn content_blocks_use_mcp_field_names() {
        let image = serde_json::to_value(ContentBlock::image("AAAA", "image/png")).unwrap();
        assert_eq!(
            image,
            serde_json::json!({"type": "image", "data": "AAAA", "mimeType": "image/png"})
        );

        let result = serde_json::to_value(ToolResult::text("done")).unwrap();
        assert_eq!(
            result,
            serde_json::json!({"content": [{"type": "text", "text": "done"}], "isError": false})
        );
    }

    #[test]
    fn error_results_carry_kind_and_flag() {
        let safe = MediaError::ModelNotFound("Model not found: nope".into()).to_safe(false);
        let result = ToolResult::error(&safe);
        assert!(result.is_error);
        assert_eq!(
            result.joined_text(),
            "Error (model_not_found): Model not found: nope"
        );
    }
}
