//! `transform_image`: image plus prompt to image.

use std::path::PathBuf;

use async_trait::async_trait;
use genmedia_core::validation::{MAX_NEGATIVE_PROMPT_LEN, MAX_PROMPT_LEN};
use genmedia_core::{MediaResult, ModelCategory, Validator};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{object, parse_args, select_model, MediaTool, IMAGE_OUTPUT_FORMATS};
use crate::context::ToolContext;
use crate::image_input::{resolve_image, ResolvedImage, TRANSFORM_MAX_BYTES};
use crate::pipeline::{run_generation, GenerationRequest};
use crate::ToolResult;

/// Arguments for `transform_image`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformImageArgs {
    /// Source image: URL, data URI, cache token, absolute path or base64.
    pub image: String,
    /// Edit instruction.
    pub prompt: String,
    /// Explicit model id.
    pub model: Option<String>,
    /// How far to move from the source (0 keeps it, 1 ignores it).
    pub strength: Option<f64>,
    /// What to avoid.
    pub negative_prompt: Option<String>,
    /// Inference steps.
    pub steps: Option<u32>,
    /// Prompt adherence.
    pub guidance_scale: Option<f64>,
    /// Seed for reproducible output.
    pub seed: Option<u64>,
    /// Output aspect ratio.
    pub aspect_ratio: Option<String>,
    /// Output format.
    pub output_format: Option<String>,
    /// Return the image inline instead of writing a file.
    #[serde(default)]
    pub inline: bool,
    /// Directory for the output file.
    pub output_dir: Option<PathBuf>,
}

impl TransformImageArgs {
    fn validate(&self) -> MediaResult<()> {
        Validator::new()
            .text("image", &self.image, usize::MAX)
            .text("prompt", &self.prompt, MAX_PROMPT_LEN)
            .optional_text(
                "negative_prompt",
                self.negative_prompt.as_deref(),
                MAX_NEGATIVE_PROMPT_LEN,
            )
            .model_id(self.model.as_deref())
            .range("strength", self.strength, 0.0, 1.0)
            .range("steps", self.steps, 1.0, 150.0)
            .range("guidance_scale", self.guidance_scale, 0.0, 30.0)
            .seed(self.seed)
            .optional_text("aspect_ratio", self.aspect_ratio.as_deref(), 32)
            .choice(
                "output_format",
                self.output_format.as_deref(),
                &IMAGE_OUTPUT_FORMATS,
            )
            .finish()
    }

    /// A strength value asks for classic img2img; otherwise instruction-based
    /// editing.
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        if self.strength.is_some() {
            "sdxl-img2img"
        } else {
            "flux-kontext-pro"
        }
    }

    fn uniform(&self, image: &ResolvedImage) -> Map<String, Value> {
        object(json!({
            "image": image.value,
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt,
            "strength": self.strength,
            "steps": self.steps,
            "guidance_scale": self.guidance_scale,
            "seed": self.seed,
            "aspect_ratio": self.aspect_ratio,
            "output_format": self.output_format,
        }))
    }
}

/// The `transform_image` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformImage;

#[async_trait]
impl MediaTool for TransformImage {
    fn name(&self) -> &'static str {
        "transform_image"
    }

    fn description(&self) -> &'static str {
        "Edit or restyle an existing image with a text instruction. Accepts a URL, \
         data URI, absolute file path, base64 string or a token from prepare_image \
         (max 10 MB). Giving a strength selects img2img; otherwise instruction editing."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image": {
                    "type": "string",
                    "description": "URL, data URI, absolute path, base64 or img_ token"
                },
                "prompt": { "type": "string", "maxLength": MAX_PROMPT_LEN },
                "model": { "type": "string" },
                "strength": { "type": "number", "minimum": 0, "maximum": 1 },
                "negative_prompt": { "type": "string", "maxLength": MAX_NEGATIVE_PROMPT_LEN },
                "steps": { "type": "integer", "minimum": 1, "maximum": 150 },
                "guidance_scale": { "type": "number", "minimum": 0, "maximum": 30 },
                "seed": { "type": "integer", "minimum": 0 },
                "aspect_ratio": { "type": "string" },
                "output_format": { "type": "string", "enum": IMAGE_OUTPUT_FORMATS },
                "inline": { "type": "boolean", "default": false },
                "output_dir": { "type": "string" }
            },
            "required": ["image", "prompt"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: TransformImageArgs = parse_args(args)?;
        args.validate()?;
        let image = resolve_image(&args.image, &ctx.cache, TRANSFORM_MAX_BYTES).await?;
        let model = select_model(
            &ctx.catalog,
            args.model.as_deref(),
            ModelCategory::ImageToImage,
            self.name(),
            args.default_model(),
        )?;

        let mut request = GenerationRequest::new(model, args.uniform(&image));
        request.inline = args.inline;
        request.output_dir.clone_from(&args.output_dir);
        Ok(run_generation(ctx, request).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmedia_core::Catalog;

    fn args(value: Value) -> TransformImageArgs {
        parse_args(value).unwrap()
    }

    #[test]
    fn strength_selects_img2img() {
        let with = args(json!({
            "image": "https://x/y.png",
            "prompt": "oil painting",
            "strength": 0.4
        }));
        let without = args(json!({"image": "https://x/y.png", "prompt": "oil painting"}));
        assert_eq!(with.default_model(), "sdxl-img2img");
        assert_eq!(without.default_model(), "flux-kontext-pro");
    }

    #[test]
    fn image_lands_on_each_models_own_parameter() {
        let catalog = Catalog::builtin().unwrap();
        let a = args(json!({"image": "https://x/y.png", "prompt": "make it snow"}));
        let image = ResolvedImage {
            value: "https://x/y.png".into(),
            mime_type: None,
            size_bytes: None,
            token: None,
        };

        let kontext = catalog.get_model("flux-kontext-pro").unwrap();
        let mapped = kontext.map_parameters(&a.uniform(&image));
        assert_eq!(mapped["input_image"], "https://x/y.png");
        assert!(!mapped.contains_key("image"));

        let img2img = catalog.get_model("sdxl-img2img").unwrap();
        let mapped = img2img.map_parameters(&a.uniform(&image));
        assert_eq!(mapped["image"], "https://x/y.png");
    }

    #[test]
    fn advertised_output_formats_are_the_accepted_ones() {
        let schema = TransformImage.input_schema();
        let listed = schema["properties"]["output_format"]["enum"].as_array().unwrap();
        assert_eq!(listed.len(), IMAGE_OUTPUT_FORMATS.len());
        let with_format = |format: &Value| {
            args(json!({"image": "https://x/y.png", "prompt": "p", "output_format": format}))
        };
        for format in listed {
            assert!(with_format(format).validate().is_ok(), "{format}");
        }
        let jpg = with_format(&json!("jpg")).validate().unwrap_err();
        assert!(jpg.to_string().contains("output_format"));
    }

    #[test]
    fn strength_out_of_range_is_rejected() {
        let a = args(json!({"image": "https://x/y.png", "prompt": "p", "strength": 1.5}));
        assert!(a.validate().unwrap_err().to_string().contains("strength"));
    }
}
