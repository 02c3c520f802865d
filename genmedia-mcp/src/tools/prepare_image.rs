//! `prepare_image`: cache a local file and hand back a short token.

use std::path::PathBuf;

use async_trait::async_trait;
use genmedia_core::{MediaError, MediaResult};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, MediaTool};
use crate::context::ToolContext;
use crate::image_input::{load_image_file, ENHANCE_MAX_BYTES};
use crate::ToolResult;

/// Arguments for `prepare_image`.
#[derive(Debug, Clone, Deserialize)]
pub struct PrepareImageArgs {
    /// Absolute path to a local image file.
    pub path: PathBuf,
}

impl PrepareImageArgs {
    fn validate(&self) -> MediaResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(MediaError::InvalidInput(
                "Invalid arguments: path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// The `prepare_image` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareImage;

#[async_trait]
impl MediaTool for PrepareImage {
    fn name(&self) -> &'static str {
        "prepare_image"
    }

    fn description(&self) -> &'static str {
        "Load a local image file once and get a short img_ token to pass as the image \
         argument of transform_image, enhance_image or generate_video. Tokens expire \
         after 15 minutes."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path to a png, jpeg, webp or gif file"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: PrepareImageArgs = parse_args(args)?;
        args.validate()?;
        let (token, entry) = load_image_file(&args.path, &ctx.cache, ENHANCE_MAX_BYTES).await?;

        let text = format!(
            "Image ready: {token}\n\
             Source: {}\n\
             Type: {}\n\
             Size: {} bytes\n\
             Valid for {} minutes. Pass the token as the image argument of another tool.",
            args.path.display(),
            entry.mime_type,
            entry.size_bytes,
            ctx.cache.ttl().as_secs() / 60,
        );
        Ok(ToolResult::text(text))
    }
}
