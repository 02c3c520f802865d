//! Response formatting.
//!
//! Turns a successful envelope into MCP content blocks. Images can be returned
//! inline; everything else is written to disk and reported by absolute path.
//! URL payloads are passed through as links.

use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use genmedia_core::redact::redact_json;
use genmedia_core::{ModelDescriptor, OutputType, ResponseEnvelope};
use serde_json::Value;

use crate::ContentBlock;

/// Where media payloads go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// Return images as inline blocks instead of files.
    pub inline: bool,
    /// Directory for written files.
    pub output_dir: PathBuf,
    /// Batch position, appended to file names when set.
    pub batch_index: Option<usize>,
}

/// Pick the output directory: explicit override, then configured default,
/// then `<temp>/genmedia`.
#[must_use]
pub fn resolve_output_dir(override_dir: Option<&Path>, default_dir: Option<&Path>) -> PathBuf {
    override_dir
        .or(default_dir)
        .map_or_else(|| std::env::temp_dir().join("genmedia"), Path::to_path_buf)
}

fn payload_keys(output: OutputType) -> &'static [&'static str] {
    match output {
        OutputType::Image => &["image", "images", "output", "image_url", "url"],
        OutputType::Video => &["video", "videos", "output", "video_url", "url"],
        OutputType::Audio => &["audio", "output", "audio_url", "url"],
        OutputType::Text => &["text", "output"],
    }
}

fn kind_label(output: OutputType) -> &'static str {
    match output {
        OutputType::Image => "image",
        OutputType::Video => "video",
        OutputType::Audio => "audio",
        OutputType::Text => "text",
    }
}

fn default_extension(output: OutputType) -> &'static str {
    match output {
        OutputType::Image => "png",
        OutputType::Video => "mp4",
        OutputType::Audio => "mp3",
        OutputType::Text => "txt",
    }
}

/// Collect string payloads under the first matching key.
fn extract_payloads(data: &Value, output: OutputType) -> Vec<String> {
    if let Value::String(single) = data {
        return vec![single.clone()];
    }
    for key in payload_keys(output) {
        match data.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return vec![s.clone()],
            Some(Value::Array(items)) => {
                let found: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        other => other.get("url").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect();
                if !found.is_empty() {
                    return found;
                }
            }
            Some(nested) if nested.is_object() => {
                let found = extract_payloads(nested, output);
                if !found.is_empty() {
                    return found;
                }
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Split a `data:<mime>;base64,` prefix off a payload.
#[must_use]
pub fn strip_data_uri(payload: &str) -> (Option<&str>, &str) {
    payload
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .map_or((None, payload), |(header, body)| {
            (Some(header.trim_end_matches(";base64")), body)
        })
}

/// File extension for a MIME type.
#[must_use]
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "audio/flac" => Some("flac"),
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first())
            .copied(),
    }
}

/// Format a successful envelope into content blocks.
///
/// # Errors
///
/// Fails when a base64 payload cannot be decoded or a file cannot be written.
pub async fn format_response(
    envelope: &ResponseEnvelope,
    model: &ModelDescriptor,
    options: &FormatOptions,
) -> anyhow::Result<Vec<ContentBlock>> {
    let Some(data) = envelope.data.as_ref() else {
        return Ok(vec![diagnostic(model, &Value::Null)]);
    };

    let output = model.output_type;
    let payloads = extract_payloads(data, output);
    if payloads.is_empty() {
        return Ok(vec![diagnostic(model, data)]);
    }

    if output == OutputType::Text {
        return Ok(payloads.into_iter().map(ContentBlock::text).collect());
    }

    let declared_format = data.get("format").and_then(Value::as_str);
    let declared_mime = data.get("mimeType").and_then(Value::as_str);
    let label = kind_label(output);
    let many = payloads.len() > 1;

    let mut blocks = Vec::with_capacity(payloads.len());
    for (n, payload) in payloads.iter().enumerate() {
        if payload.starts_with("http://") || payload.starts_with("https://") {
            blocks.push(ContentBlock::text(format!("Generated {label} URL: {payload}")));
            continue;
        }

        let (uri_mime, base64) = strip_data_uri(payload);
        let mime = uri_mime.or(declared_mime);
        let extension = declared_format
            .map(|f| if f == "jpeg" { "jpg" } else { f })
            .or_else(|| mime.and_then(extension_for_mime))
            .or_else(|| model.supported_formats.first().map(String::as_str))
            .unwrap_or_else(|| default_extension(output));

        if output == OutputType::Image && options.inline {
            let mime = mime.map_or_else(
                || {
                    mime_guess::from_ext(extension)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string()
                },
                str::to_string,
            );
            blocks.push(ContentBlock::image(base64, mime));
            continue;
        }

        let bytes = STANDARD
            .decode(base64.trim())
            .with_context(|| format!("Upstream returned an undecodable {label} payload"))?;
        let suffix = match (options.batch_index, many) {
            (Some(batch), true) => format!("-{}-{}", batch + 1, n + 1),
            (Some(batch), false) => format!("-{}", batch + 1),
            (None, true) => format!("-{}", n + 1),
            (None, false) => String::new(),
        };
        let path = write_output(&options.output_dir, &model.id, &suffix, extension, &bytes).await?;
        blocks.push(ContentBlock::text(format!(
            "Saved {label} to {} ({} bytes)",
            path.display(),
            bytes.len()
        )));
    }
    Ok(blocks)
}

fn diagnostic(model: &ModelDescriptor, data: &Value) -> ContentBlock {
    tracing::warn!(model = %model.id, "unrecognised response shape");
    ContentBlock::text(format!(
        "Unexpected response from {} ({}): no {} payload found. Raw response: {}",
        model.name,
        model.id,
        kind_label(model.output_type),
        redact_json(data)
    ))
}

/// Write `{model_id}-{epochMillis}{suffix}.{ext}` and return its absolute path.
async fn write_output(
    dir: &Path,
    model_id: &str,
    suffix: &str,
    extension: &str,
    bytes: &[u8],
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Cannot create output directory {}", dir.display()))?;

    let millis = chrono::Utc::now().timestamp_millis();
    let mut path = dir.join(format!("{model_id}-{millis}{suffix}.{extension}"));
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        path = dir.join(format!(
            "{model_id}-{millis}{suffix}-{}.{extension}",
            &unique[..8]
        ));
    }

    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Cannot write output file {}", path.display()))?;
    let absolute = std::path::absolute(&path).unwrap_or(path);
    tracing::info!(path = %absolute.display(), bytes = bytes.len(), "output written");
    Ok(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmedia_core::Catalog;
    use serde_json::json;

    fn model(id: &str) -> ModelDescriptor {
        Catalog::builtin().unwrap().get_model(id).unwrap().clone()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn binary_image_is_written_with_model_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = ResponseEnvelope::with_data(json!({
            "image": STANDARD.encode(b"\x89PNG fake"),
            "format": "png",
            "mimeType": "image/png"
        }));
        let options = FormatOptions {
            inline: false,
            output_dir: dir.path().to_path_buf(),
            batch_index: None,
        };

        let blocks = format_response(&envelope, &model("sdxl"), &options).await.unwrap();
        assert_eq!(blocks.len(), 1);
        let files = files_in(dir.path());
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sdxl-"));
        assert!(name.ends_with(".png"));
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"\x89PNG fake");
        assert!(blocks[0].as_text().unwrap().contains(&files[0].display().to_string()));
    }

    #[tokio::test]
    async fn missing_output_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("renders").join("today");
        let envelope = ResponseEnvelope::with_data(json!({
            "audio": STANDARD.encode(b"RIFF fake"),
            "format": "wav"
        }));
        let options = FormatOptions {
            inline: false,
            output_dir: nested.clone(),
            batch_index: Some(0),
        };

        let blocks = format_response(&envelope, &model("orpheus-tts"), &options)
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        let files = files_in(&nested);
        assert_eq!(files.len(), 1);
        assert!(files[0].to_str().unwrap().ends_with("-1.wav"));
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"RIFF fake");
    }

    #[tokio::test]
    async fn inline_images_strip_data_uri_prefix() {
        let envelope = ResponseEnvelope::with_data(json!({
            "image": "data:image/jpeg;base64,/9j/AAAA"
        }));
        let options = FormatOptions {
            inline: true,
            output_dir: PathBuf::from("/nonexistent"),
            batch_index: None,
        };
        let blocks = format_response(&envelope, &model("flux-schnell"), &options).await.unwrap();
        assert_eq!(blocks, vec![ContentBlock::image("/9j/AAAA", "image/jpeg")]);
    }

    #[tokio::test]
    async fn url_payloads_become_links() {
        let envelope = ResponseEnvelope::with_data(json!({
            "output": ["https://cdn.example.com/a.mp4"]
        }));
        let options = FormatOptions {
            inline: false,
            output_dir: PathBuf::from("/nonexistent"),
            batch_index: None,
        };
        let blocks = format_response(&envelope, &model("kling-2.1"), &options).await.unwrap();
        assert_eq!(
            blocks[0].as_text(),
            Some("Generated video URL: https://cdn.example.com/a.mp4")
        );
    }

    #[tokio::test]
    async fn multiple_payloads_get_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = ResponseEnvelope::with_data(json!({
            "audio": [STANDARD.encode(b"one"), STANDARD.encode(b"two")]
        }));
        let options = FormatOptions {
            inline: false,
            output_dir: dir.path().to_path_buf(),
            batch_index: None,
        };
        let blocks = format_response(&envelope, &model("orpheus-tts"), &options).await.unwrap();
        assert_eq!(blocks.len(), 2);
        let files = files_in(dir.path());
        assert!(files[0].to_str().unwrap().ends_with("-1.wav"));
        assert!(files[1].to_str().unwrap().ends_with("-2.wav"));
    }

    #[tokio::test]
    async fn unknown_shapes_become_diagnostics() {
        let envelope = ResponseEnvelope::with_data(json!({"status": "ok", "api_key": "SG_123"}));
        let options = FormatOptions {
            inline: false,
            output_dir: PathBuf::from("/nonexistent"),
            batch_index: None,
        };
        let blocks = format_response(&envelope, &model("dia"), &options).await.unwrap();
        let text = blocks[0].as_text().unwrap();
        assert!(text.contains("Unexpected response from"));
        assert!(!text.contains("SG_123"));
    }

    #[test]
    fn output_dir_precedence() {
        let explicit = Path::new("/explicit");
        let configured = Path::new("/configured");
        assert_eq!(resolve_output_dir(Some(explicit), Some(configured)), explicit);
        assert_eq!(resolve_output_dir(None, Some(configured)), configured);
        assert_eq!(
            resolve_output_dir(None, None),
            std::env::temp_dir().join("genmedia")
        );
    }

    #[test]
    fn data_uri_prefix_is_split() {
        assert_eq!(
            strip_data_uri("data:audio/wav;base64,UklGRg=="),
            (Some("audio/wav"), "UklGRg==")
        );
        assert_eq!(strip_data_uri("UklGRg=="), (None, "UklGRg=="));
    }
}
