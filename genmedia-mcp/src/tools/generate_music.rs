//! `generate_music`: prompt to music.

use std::path::PathBuf;

use async_trait::async_trait;
use genmedia_core::validation::{MAX_NEGATIVE_PROMPT_LEN, MAX_PROMPT_LEN};
use genmedia_core::{MediaResult, ModelCategory, Validator};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{object, parse_args, select_model, MediaTool};
use crate::context::ToolContext;
use crate::pipeline::{run_generation, GenerationRequest};
use crate::ToolResult;

/// Clips longer than this need the long-form model.
pub const SHORT_CLIP_SECS: u32 = 30;

/// Longest clip any music model produces.
pub const MAX_DURATION_SECS: u32 = 120;

/// Arguments for `generate_music`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateMusicArgs {
    /// Style, mood and instrumentation.
    pub prompt: String,
    /// Explicit model id.
    pub model: Option<String>,
    /// Clip length in seconds.
    pub duration: Option<u32>,
    /// What to avoid.
    pub negative_prompt: Option<String>,
    /// Seed for reproducible output.
    pub seed: Option<u64>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Directory for the output file.
    pub output_dir: Option<PathBuf>,
}

impl GenerateMusicArgs {
    fn validate(&self) -> MediaResult<()> {
        Validator::new()
            .text("prompt", &self.prompt, MAX_PROMPT_LEN)
            .optional_text(
                "negative_prompt",
                self.negative_prompt.as_deref(),
                MAX_NEGATIVE_PROMPT_LEN,
            )
            .model_id(self.model.as_deref())
            .range("duration", self.duration, 1.0, f64::from(MAX_DURATION_SECS))
            .range("temperature", self.temperature, 0.0, 2.0)
            .seed(self.seed)
            .finish()
    }

    /// Long clips need the long-form model.
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        match self.duration {
            Some(secs) if secs > SHORT_CLIP_SECS => "meta-musicgen-medium",
            _ => "lyria-2",
        }
    }

    fn uniform(&self) -> Map<String, Value> {
        object(json!({
            "prompt": self.prompt,
            "duration": self.duration,
            "negative_prompt": self.negative_prompt,
            "seed": self.seed,
            "temperature": self.temperature,
        }))
    }
}

/// The `generate_music` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateMusic;

#[async_trait]
impl MediaTool for GenerateMusic {
    fn name(&self) -> &'static str {
        "generate_music"
    }

    fn description(&self) -> &'static str {
        "Generate instrumental music from a description of style and mood. Clips over \
         30 seconds use a long-form model. Audio is saved to disk."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "maxLength": MAX_PROMPT_LEN },
                "model": { "type": "string" },
                "duration": { "type": "integer", "minimum": 1, "maximum": MAX_DURATION_SECS },
                "negative_prompt": { "type": "string", "maxLength": MAX_NEGATIVE_PROMPT_LEN },
                "seed": { "type": "integer", "minimum": 0 },
                "temperature": { "type": "number", "minimum": 0, "maximum": 2 },
                "output_dir": { "type": "string" }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: GenerateMusicArgs = parse_args(args)?;
        args.validate()?;
        let model = select_model(
            &ctx.catalog,
            args.model.as_deref(),
            ModelCategory::Music,
            self.name(),
            args.default_model(),
        )?;

        let mut request = GenerationRequest::new(model, args.uniform());
        request.output_dir.clone_from(&args.output_dir);
        Ok(run_generation(ctx, request).await?.into())
    }
}
