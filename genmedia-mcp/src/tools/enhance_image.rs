//! `enhance_image`: upscaling and face restoration.

use std::path::PathBuf;

use async_trait::async_trait;
use genmedia_core::{MediaResult, ModelCategory, Validator};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{object, parse_args, select_model, MediaTool};
use crate::context::ToolContext;
use crate::image_input::{resolve_image, ResolvedImage, ENHANCE_MAX_BYTES};
use crate::pipeline::{run_generation, GenerationRequest};
use crate::ToolResult;

/// What kind of enhancement to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceOperation {
    /// Super-resolution.
    #[default]
    Upscale,
    /// Face restoration.
    FaceRestore,
}

/// Arguments for `enhance_image`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceImageArgs {
    /// Source image: URL, data URI, cache token, absolute path or base64.
    pub image: String,
    /// Enhancement kind.
    pub operation: Option<EnhanceOperation>,
    /// Explicit model id.
    pub model: Option<String>,
    /// Upscale factor.
    pub scale: Option<u32>,
    /// Restoration fidelity (0 favours quality, 1 favours identity).
    pub fidelity: Option<f64>,
    /// Also restore faces while upscaling.
    pub face_enhance: Option<bool>,
    /// Return the image inline instead of writing a file.
    #[serde(default)]
    pub inline: bool,
    /// Directory for the output file.
    pub output_dir: Option<PathBuf>,
}

impl EnhanceImageArgs {
    fn validate(&self) -> MediaResult<()> {
        Validator::new()
            .text("image", &self.image, usize::MAX)
            .model_id(self.model.as_deref())
            .range("scale", self.scale, 1.0, 4.0)
            .range("fidelity", self.fidelity, 0.0, 1.0)
            .finish()
    }

    /// Face restoration goes to the face model, everything else to the
    /// upscaler.
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        match self.operation.unwrap_or_default() {
            EnhanceOperation::FaceRestore => "codeformer",
            EnhanceOperation::Upscale => "esrgan",
        }
    }

    fn uniform(&self, image: &ResolvedImage) -> Map<String, Value> {
        object(json!({
            "image": image.value,
            "scale": self.scale,
            "fidelity": self.fidelity,
            "face_enhance": self.face_enhance,
        }))
    }
}

/// The `enhance_image` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnhanceImage;

#[async_trait]
impl MediaTool for EnhanceImage {
    fn name(&self) -> &'static str {
        "enhance_image"
    }

    fn description(&self) -> &'static str {
        "Upscale an image or restore faces in it. Accepts a URL, data URI, absolute \
         file path, base64 string or a token from prepare_image (max 20 MB)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image": {
                    "type": "string",
                    "description": "URL, data URI, absolute path, base64 or img_ token"
                },
                "operation": {
                    "type": "string",
                    "enum": ["upscale", "face_restore"],
                    "default": "upscale"
                },
                "model": { "type": "string" },
                "scale": { "type": "integer", "minimum": 1, "maximum": 4 },
                "fidelity": { "type": "number", "minimum": 0, "maximum": 1 },
                "face_enhance": { "type": "boolean" },
                "inline": { "type": "boolean", "default": false },
                "output_dir": { "type": "string" }
            },
            "required": ["image"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: EnhanceImageArgs = parse_args(args)?;
        args.validate()?;
        let image = resolve_image(&args.image, &ctx.cache, ENHANCE_MAX_BYTES).await?;
        let model = select_model(
            &ctx.catalog,
            args.model.as_deref(),
            ModelCategory::ImageEnhance,
            self.name(),
            args.default_model(),
        )?;

        let mut request = GenerationRequest::new(model, args.uniform(&image));
        request.inline = args.inline;
        request.output_dir.clone_from(&args.output_dir);
        Ok(run_generation(ctx, request).await?.into())
    }
}
