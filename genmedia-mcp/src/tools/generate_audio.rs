//! `generate_audio`: text to speech.

use std::path::PathBuf;

use async_trait::async_trait;
use genmedia_core::{MediaResult, ModelCategory, Validator};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{object, parse_args, select_model, MediaTool};
use crate::context::ToolContext;
use crate::pipeline::{run_generation, GenerationRequest};
use crate::ToolResult;

/// Longest accepted script.
pub const MAX_TEXT_LEN: usize = 10_000;

/// Voices offered by the single-speaker model.
pub const VOICES: &[&str] = &["tara", "leah", "jess", "leo", "dan", "mia", "zac", "zoe"];

/// Whether the text is a dialogue script with `[S1]`/`[S2]` speaker tags.
#[must_use]
pub fn has_speaker_tags(text: &str) -> bool {
    text.contains("[S1]") || text.contains("[S2]")
}

/// Arguments for `generate_audio`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateAudioArgs {
    /// What to say.
    pub text: String,
    /// Explicit model id.
    pub model: Option<String>,
    /// Voice for single-speaker synthesis.
    pub voice: Option<String>,
    /// Speaking rate multiplier.
    pub speed: Option<f64>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Seed for reproducible output.
    pub seed: Option<u64>,
    /// Directory for the output file.
    pub output_dir: Option<PathBuf>,
}

impl GenerateAudioArgs {
    fn validate(&self) -> MediaResult<()> {
        Validator::new()
            .text("text", &self.text, MAX_TEXT_LEN)
            .model_id(self.model.as_deref())
            .choice("voice", self.voice.as_deref(), VOICES)
            .range("speed", self.speed, 0.5, 2.0)
            .range("temperature", self.temperature, 0.0, 2.0)
            .seed(self.seed)
            .finish()
    }

    /// Dialogue scripts go to the multi-speaker model.
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        if has_speaker_tags(&self.text) {
            "dia"
        } else {
            "orpheus-tts"
        }
    }

    fn uniform(&self) -> Map<String, Value> {
        object(json!({
            "text": self.text,
            "voice": self.voice,
            "speed": self.speed,
            "temperature": self.temperature,
            "seed": self.seed,
        }))
    }
}

/// The `generate_audio` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateAudio;

#[async_trait]
impl MediaTool for GenerateAudio {
    fn name(&self) -> &'static str {
        "generate_audio"
    }

    fn description(&self) -> &'static str {
        "Convert text to speech. Text containing [S1]/[S2] speaker tags is rendered \
         as a dialogue; otherwise a single voice reads it. Audio is saved to disk."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "maxLength": MAX_TEXT_LEN },
                "model": { "type": "string" },
                "voice": { "type": "string", "enum": VOICES },
                "speed": { "type": "number", "minimum": 0.5, "maximum": 2.0 },
                "temperature": { "type": "number", "minimum": 0, "maximum": 2 },
                "seed": { "type": "integer", "minimum": 0 },
                "output_dir": { "type": "string" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: GenerateAudioArgs = parse_args(args)?;
        args.validate()?;
        let model = select_model(
            &ctx.catalog,
            args.model.as_deref(),
            ModelCategory::TextToSpeech,
            self.name(),
            args.default_model(),
        )?;

        let mut request = GenerationRequest::new(model, args.uniform());
        request.output_dir.clone_from(&args.output_dir);
        Ok(run_generation(ctx, request).await?.into())
    }
}
