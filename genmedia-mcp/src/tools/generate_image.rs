//! `generate_image`: prompt to image.

use std::path::PathBuf;

use async_trait::async_trait;
use genmedia_core::validation::{MAX_NEGATIVE_PROMPT_LEN, MAX_PROMPT_LEN};
use genmedia_core::{MediaResult, ModelCategory, Validator};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{object, parse_args, select_model, MediaTool, Quality, IMAGE_OUTPUT_FORMATS};
use crate::context::ToolContext;
use crate::pipeline::{run_generation, GenerationRequest};
use crate::ToolResult;

/// Prompts longer than this go to the long-prompt model.
pub const LONG_PROMPT_CHARS: usize = 300;

/// Maximum images per call.
pub const MAX_IMAGES: u32 = 4;

/// Arguments for `generate_image`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateImageArgs {
    /// What to draw.
    pub prompt: String,
    /// What to avoid.
    pub negative_prompt: Option<String>,
    /// Explicit model id.
    pub model: Option<String>,
    /// Quality tier used when no model is given.
    pub quality: Option<Quality>,
    /// Output width in pixels.
    pub width: Option<u32>,
    /// Output height in pixels.
    pub height: Option<u32>,
    /// Inference steps.
    pub steps: Option<u32>,
    /// Prompt adherence.
    pub guidance_scale: Option<f64>,
    /// Seed for reproducible output.
    pub seed: Option<u64>,
    /// Aspect ratio such as `16:9`, for models that take one.
    pub aspect_ratio: Option<String>,
    /// `png`, `jpeg` or `webp`.
    pub output_format: Option<String>,
    /// Number of images, generated sequentially.
    pub num_images: Option<u32>,
    /// Return the image inline instead of writing a file.
    #[serde(default)]
    pub inline: bool,
    /// Directory for the output file.
    pub output_dir: Option<PathBuf>,
}

impl GenerateImageArgs {
    fn validate(&self) -> MediaResult<()> {
        Validator::new()
            .text("prompt", &self.prompt, MAX_PROMPT_LEN)
            .optional_text(
                "negative_prompt",
                self.negative_prompt.as_deref(),
                MAX_NEGATIVE_PROMPT_LEN,
            )
            .model_id(self.model.as_deref())
            .range("width", self.width, 64.0, 4096.0)
            .range("height", self.height, 64.0, 4096.0)
            .range("steps", self.steps, 1.0, 150.0)
            .range("guidance_scale", self.guidance_scale, 0.0, 30.0)
            .range("num_images", self.num_images, 1.0, f64::from(MAX_IMAGES))
            .seed(self.seed)
            .optional_text("aspect_ratio", self.aspect_ratio.as_deref(), 32)
            .choice(
                "output_format",
                self.output_format.as_deref(),
                &IMAGE_OUTPUT_FORMATS,
            )
            .finish()
    }

    /// Heuristic model when none is given: quality tier first, then prompt
    /// length.
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        match self.quality.unwrap_or_default() {
            Quality::Fast => "flux-schnell",
            Quality::High => "flux-1.1-pro",
            Quality::Balanced if self.prompt.chars().count() > LONG_PROMPT_CHARS => "seedream-v3",
            Quality::Balanced => "sdxl",
        }
    }

    fn uniform(&self) -> Map<String, Value> {
        object(json!({
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt,
            "width": self.width,
            "height": self.height,
            "steps": self.steps,
            "guidance_scale": self.guidance_scale,
            "seed": self.seed,
            "aspect_ratio": self.aspect_ratio,
            "output_format": self.output_format,
        }))
    }
}

/// The `generate_image` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateImage;

#[async_trait]
impl MediaTool for GenerateImage {
    fn name(&self) -> &'static str {
        "generate_image"
    }

    fn description(&self) -> &'static str {
        "Generate images from a text prompt. Picks a model from the quality tier \
         (fast, balanced, high) and prompt length unless a model id is given. \
         Images are saved to disk unless inline is true."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "maxLength": MAX_PROMPT_LEN,
                    "description": "What to draw"
                },
                "negative_prompt": { "type": "string", "maxLength": MAX_NEGATIVE_PROMPT_LEN },
                "model": { "type": "string", "description": "Explicit model id (see list_models)" },
                "quality": {
                    "type": "string",
                    "enum": ["fast", "balanced", "high"],
                    "default": "balanced"
                },
                "width": { "type": "integer", "minimum": 64, "maximum": 4096 },
                "height": { "type": "integer", "minimum": 64, "maximum": 4096 },
                "steps": { "type": "integer", "minimum": 1, "maximum": 150 },
                "guidance_scale": { "type": "number", "minimum": 0, "maximum": 30 },
                "seed": { "type": "integer", "minimum": 0, "maximum": 4_294_967_295_u64 },
                "aspect_ratio": { "type": "string", "description": "e.g. 1:1, 16:9" },
                "output_format": { "type": "string", "enum": IMAGE_OUTPUT_FORMATS },
                "num_images": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_IMAGES,
                    "default": 1
                },
                "inline": { "type": "boolean", "default": false },
                "output_dir": { "type": "string", "description": "Directory for saved files" }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: GenerateImageArgs = parse_args(args)?;
        args.validate()?;
        let model = select_model(
            &ctx.catalog,
            args.model.as_deref(),
            ModelCategory::TextToImage,
            self.name(),
            args.default_model(),
        )?;

        let mut request = GenerationRequest::new(model, args.uniform());
        request.inline = args.inline;
        request.output_dir.clone_from(&args.output_dir);
        request.batch = args.num_images.unwrap_or(1) as usize;
        Ok(run_generation(ctx, request).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> GenerateImageArgs {
        parse_args(value).unwrap()
    }

    #[test]
    fn quality_tier_picks_the_model() {
        let model = |quality: &str| {
            args(json!({"prompt": "cat", "quality": quality})).default_model()
        };
        assert_eq!(model("fast"), "flux-schnell");
        assert_eq!(model("high"), "flux-1.1-pro");
        assert_eq!(args(json!({"prompt": "cat"})).default_model(), "sdxl");
    }

    #[test]
    fn long_prompts_pick_the_long_prompt_model() {
        let long = "a ".repeat(200);
        assert_eq!(args(json!({"prompt": long})).default_model(), "seedream-v3");
        assert_eq!(
            args(json!({"prompt": long, "quality": "fast"})).default_model(),
            "flux-schnell"
        );
    }

    #[test]
    fn selection_is_deterministic() {
        let a = args(json!({"prompt": "a lighthouse at dusk", "quality": "balanced"}));
        let picks: Vec<&str> = (0..10).map(|_| a.default_model()).collect();
        assert!(picks.iter().all(|p| *p == picks[0]));
    }

    #[test]
    fn validation_rejects_out_of_range_arguments() {
        let bad = args(json!({"prompt": "", "width": 10, "num_images": 9}));
        let message = bad.validate().unwrap_err().to_string();
        assert!(message.contains("prompt must not be empty"));
        assert!(message.contains("width"));
        assert!(message.contains("num_images"));
    }

    #[test]
    fn unknown_quality_is_rejected_by_deserialization() {
        let parsed = parse_args::<GenerateImageArgs>(json!({"prompt": "x", "quality": "ultra"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn advertised_output_formats_are_the_accepted_ones() {
        let schema = GenerateImage.input_schema();
        let listed = schema["properties"]["output_format"]["enum"].as_array().unwrap();
        assert_eq!(listed, &vec![json!("png"), json!("jpeg"), json!("webp")]);
        for format in listed {
            let a = args(json!({"prompt": "cat", "output_format": format}));
            assert!(a.validate().is_ok(), "{format}");
        }
        let jpg = args(json!({"prompt": "cat", "output_format": "jpg"}));
        assert!(jpg.validate().unwrap_err().to_string().contains("output_format"));
    }

    #[test]
    fn absent_arguments_stay_null_in_uniform_map() {
        let a = args(json!({"prompt": "cat", "width": 768}));
        let uniform = a.uniform();
        assert_eq!(uniform["prompt"], "cat");
        assert_eq!(uniform["width"], 768);
        assert!(uniform["height"].is_null());
    }
}
