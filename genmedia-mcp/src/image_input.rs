//! Image argument resolution.
//!
//! Tools that take an image accept any of: an `http(s)` URL, a `data:` URI,
//! a cache token from `prepare_image`, an absolute file path, or raw base64.
//! Files are read, size-checked and cached so the caller can reuse them by
//! token.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use genmedia_core::cache::decoded_len;
use genmedia_core::{CachedImage, ImageCache, MediaError, MediaResult};

/// Size limit for transform inputs and video start frames.
pub const TRANSFORM_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Size limit for enhancement inputs.
pub const ENHANCE_MAX_BYTES: usize = 20 * 1024 * 1024;

const MIN_BASE64_LEN: usize = 16;

/// Classified image argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote URL, passed through untouched.
    Url(String),
    /// `data:<mime>;base64,<payload>`.
    DataUri {
        /// Declared MIME type.
        mime_type: String,
        /// Raw base64.
        base64: String,
    },
    /// Token from the image cache.
    Token(String),
    /// Local file.
    Path(PathBuf),
    /// Raw base64.
    Base64(String),
}

/// Upstream-ready image value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    /// URL or raw base64 sent to the model.
    pub value: String,
    /// MIME type, when known.
    pub mime_type: Option<String>,
    /// Decoded size, when known.
    pub size_bytes: Option<usize>,
    /// Cache token, when the image came from or went into the cache.
    pub token: Option<String>,
}

/// Decide what kind of reference an argument is.
///
/// # Errors
///
/// Returns [`MediaError::InvalidInput`] for empty input, relative paths and
/// strings that match no accepted form.
pub fn classify(input: &str) -> MediaResult<ImageSource> {
    let input = input.trim();
    if input.is_empty() {
        return Err(MediaError::InvalidInput("image must not be empty".into()));
    }

    if input.starts_with("http://") || input.starts_with("https://") {
        return Ok(ImageSource::Url(input.to_string()));
    }

    if let Some(rest) = input.strip_prefix("data:") {
        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            MediaError::InvalidInput("Malformed data URI: missing ',' separator".into())
        })?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| MediaError::InvalidInput("Data URI must be base64 encoded".into()))?;
        return Ok(ImageSource::DataUri {
            mime_type: mime_type.to_string(),
            base64: payload.to_string(),
        });
    }

    if ImageCache::looks_like_token(input) {
        return Ok(ImageSource::Token(input.to_string()));
    }

    if is_jpeg_base64(input) {
        return Ok(ImageSource::Base64(input.to_string()));
    }

    let path = Path::new(input);
    if input.starts_with('/') || path.is_absolute() {
        return Ok(ImageSource::Path(path.to_path_buf()));
    }
    if looks_like_path(input) {
        return Err(MediaError::InvalidInput(format!(
            "Image path must be absolute: {input}"
        )));
    }

    if input.len() >= MIN_BASE64_LEN && is_base64(input) {
        return Ok(ImageSource::Base64(input.to_string()));
    }

    Err(MediaError::InvalidInput(
        "image must be a URL, data URI, cache token, absolute file path or base64 string".into(),
    ))
}

/// `/9j/` is the base64 of the JPEG start-of-image marker, the only image
/// payload that begins with a slash.
fn is_jpeg_base64(input: &str) -> bool {
    input.starts_with("/9j/") && input.len() >= MIN_BASE64_LEN && is_base64(input)
}

/// Relative paths have an extension on their last component or exist on disk.
fn looks_like_path(input: &str) -> bool {
    if input.chars().any(char::is_whitespace) {
        return false;
    }
    let path = Path::new(input);
    path.extension().is_some() || (input.len() < 4096 && path.exists())
}

fn is_base64(input: &str) -> bool {
    input
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\n' | b'\r'))
}

/// Resolve an image argument into an upstream value.
///
/// # Errors
///
/// Returns [`MediaError::InvalidInput`] for unknown or expired tokens,
/// missing files, unsupported file types and payloads over `max_bytes`.
pub async fn resolve_image(
    input: &str,
    cache: &ImageCache,
    max_bytes: usize,
) -> MediaResult<ResolvedImage> {
    match classify(input)? {
        ImageSource::Url(url) => Ok(ResolvedImage {
            value: url,
            mime_type: None,
            size_bytes: None,
            token: None,
        }),
        ImageSource::DataUri { mime_type, base64 } => {
            let size = check_size(decoded_len(&base64), max_bytes, "image data")?;
            Ok(ResolvedImage {
                value: base64,
                mime_type: Some(mime_type),
                size_bytes: Some(size),
                token: None,
            })
        }
        ImageSource::Base64(base64) => {
            let size = check_size(decoded_len(&base64), max_bytes, "image data")?;
            Ok(ResolvedImage {
                value: base64,
                mime_type: None,
                size_bytes: Some(size),
                token: None,
            })
        }
        ImageSource::Token(token) => {
            let entry = cache.get(&token).ok_or_else(|| {
                MediaError::InvalidInput(format!(
                    "Image reference {token} is unknown or expired; call prepare_image again"
                ))
            })?;
            check_size(entry.size_bytes, max_bytes, &token)?;
            Ok(ResolvedImage {
                value: entry.base64.to_string(),
                mime_type: Some(entry.mime_type),
                size_bytes: Some(entry.size_bytes),
                token: Some(token),
            })
        }
        ImageSource::Path(path) => {
            let (token, entry) = load_image_file(&path, cache, max_bytes).await?;
            Ok(ResolvedImage {
                value: entry.base64.to_string(),
                mime_type: Some(entry.mime_type),
                size_bytes: Some(entry.size_bytes),
                token: Some(token),
            })
        }
    }
}

/// Read an image file, base64-encode it and store it in the cache.
///
/// # Errors
///
/// Returns [`MediaError::InvalidInput`] if the file is missing, unreadable,
/// not an image or larger than `max_bytes`.
pub async fn load_image_file(
    path: &Path,
    cache: &ImageCache,
    max_bytes: usize,
) -> MediaResult<(String, CachedImage)> {
    if !path.is_absolute() {
        return Err(MediaError::InvalidInput(format!(
            "Image path must be absolute: {}",
            path.display()
        )));
    }

    let metadata = tokio::fs::metadata(path).await.map_err(|_| {
        MediaError::InvalidInput(format!("Image file not found: {}", path.display()))
    })?;
    if !metadata.is_file() {
        return Err(MediaError::InvalidInput(format!(
            "Image path is not a file: {}",
            path.display()
        )));
    }
    let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    check_size(size, max_bytes, &path.display().to_string())?;

    let mime_type = mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .ok_or_else(|| {
            MediaError::InvalidInput(format!(
                "Unsupported image type: {} (expected png, jpeg, webp or gif)",
                path.display()
            ))
        })?;

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        MediaError::InvalidInput(format!("Cannot read image file {}: {e}", path.display()))
    })?;
    let base64 = STANDARD.encode(&bytes);
    let token = cache.store(&base64, mime_type.essence_str(), Some(path));
    tracing::debug!(path = %path.display(), bytes = bytes.len(), %token, "image file cached");

    let entry = cache.get(&token).ok_or_else(|| {
        MediaError::InvalidInput(format!("Image reference {token} expired immediately"))
    })?;
    Ok((token, entry))
}

fn check_size(size: usize, max_bytes: usize, what: &str) -> MediaResult<usize> {
    if size > max_bytes {
        return Err(MediaError::InvalidInput(format!(
            "{what} is {size} bytes, over the {} MB limit",
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(size)
}
