//! `generate_video`: prompt (and optional start frame) to video.

use std::path::PathBuf;

use async_trait::async_trait;
use genmedia_core::validation::{MAX_NEGATIVE_PROMPT_LEN, MAX_PROMPT_LEN};
use genmedia_core::{MediaResult, ModelCategory, Validator};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{object, parse_args, select_model, MediaTool, Quality};
use crate::context::ToolContext;
use crate::image_input::{resolve_image, ResolvedImage, TRANSFORM_MAX_BYTES};
use crate::pipeline::{run_generation, GenerationRequest};
use crate::ToolResult;

/// Arguments for `generate_video`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateVideoArgs {
    /// Scene description.
    pub prompt: String,
    /// Optional start frame.
    pub image: Option<String>,
    /// Explicit model id.
    pub model: Option<String>,
    /// Quality tier used when no model is given.
    pub quality: Option<Quality>,
    /// Clip length in seconds.
    pub duration: Option<u32>,
    /// Frame aspect ratio.
    pub aspect_ratio: Option<String>,
    /// Output resolution, for models that take one.
    pub resolution: Option<String>,
    /// What to avoid.
    pub negative_prompt: Option<String>,
    /// Seed for reproducible output.
    pub seed: Option<u64>,
    /// Directory for the output file.
    pub output_dir: Option<PathBuf>,
}

impl GenerateVideoArgs {
    fn validate(&self) -> MediaResult<()> {
        Validator::new()
            .text("prompt", &self.prompt, MAX_PROMPT_LEN)
            .optional_text(
                "negative_prompt",
                self.negative_prompt.as_deref(),
                MAX_NEGATIVE_PROMPT_LEN,
            )
            .model_id(self.model.as_deref())
            .range("duration", self.duration, 1.0, 10.0)
            .choice(
                "aspect_ratio",
                self.aspect_ratio.as_deref(),
                &["16:9", "9:16", "1:1", "4:3", "3:4", "21:9"],
            )
            .choice("resolution", self.resolution.as_deref(), &["480p", "720p"])
            .seed(self.seed)
            .finish()
    }

    /// A start frame or the high tier needs the image-conditioned model.
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        if self.image.is_some() || self.quality == Some(Quality::High) {
            "kling-2.1"
        } else {
            "seedance-v1-lite"
        }
    }

    fn uniform(&self, image: Option<&ResolvedImage>) -> Map<String, Value> {
        object(json!({
            "prompt": self.prompt,
            "image": image.map(|i| i.value.as_str()),
            "duration": self.duration,
            "aspect_ratio": self.aspect_ratio,
            "resolution": self.resolution,
            "negative_prompt": self.negative_prompt,
            "seed": self.seed,
        }))
    }
}

/// The `generate_video` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateVideo;

#[async_trait]
impl MediaTool for GenerateVideo {
    fn name(&self) -> &'static str {
        "generate_video"
    }

    fn description(&self) -> &'static str {
        "Generate a short video clip from a text prompt, optionally starting from an \
         image. Videos are always saved to disk. Some models run as queued jobs and \
         can take several minutes."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "maxLength": MAX_PROMPT_LEN },
                "image": { "type": "string", "description": "Optional start frame (max 10 MB)" },
                "model": { "type": "string" },
                "quality": {
                    "type": "string",
                    "enum": ["fast", "balanced", "high"],
                    "default": "balanced"
                },
                "duration": { "type": "integer", "enum": [5, 10], "default": 5 },
                "aspect_ratio": {
                    "type": "string",
                    "enum": ["16:9", "9:16", "1:1", "4:3", "3:4", "21:9"]
                },
                "resolution": { "type": "string", "enum": ["480p", "720p"] },
                "negative_prompt": { "type": "string", "maxLength": MAX_NEGATIVE_PROMPT_LEN },
                "seed": { "type": "integer", "minimum": 0 },
                "output_dir": { "type": "string" }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: GenerateVideoArgs = parse_args(args)?;
        args.validate()?;
        let image = match args.image.as_deref() {
            Some(image) => Some(resolve_image(image, &ctx.cache, TRANSFORM_MAX_BYTES).await?),
            None => None,
        };
        let model = select_model(
            &ctx.catalog,
            args.model.as_deref(),
            ModelCategory::Video,
            self.name(),
            args.default_model(),
        )?;

        let mut request = GenerationRequest::new(model, args.uniform(image.as_ref()));
        request.output_dir.clone_from(&args.output_dir);
        Ok(run_generation(ctx, request).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> GenerateVideoArgs {
        parse_args(value).unwrap()
    }

    #[test]
    fn start_frame_or_high_quality_selects_kling() {
        assert_eq!(
            args(json!({"prompt": "waves", "image": "https://x/f.png"})).default_model(),
            "kling-2.1"
        );
        assert_eq!(
            args(json!({"prompt": "waves", "quality": "high"})).default_model(),
            "kling-2.1"
        );
        assert_eq!(args(json!({"prompt": "waves"})).default_model(), "seedance-v1-lite");
        assert_eq!(
            args(json!({"prompt": "waves", "quality": "fast"})).default_model(),
            "seedance-v1-lite"
        );
    }

    #[test]
    fn unsupported_resolution_is_rejected() {
        let a = args(json!({"prompt": "waves", "resolution": "4k"}));
        assert!(a.validate().unwrap_err().to_string().contains("resolution"));
    }
}
