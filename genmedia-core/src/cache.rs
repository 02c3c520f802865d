//! Short-lived image reference cache.
//!
//! Lets a caller ingest a large image once and refer to it by token in later
//! tool calls. Entries expire after a fixed TTL and the cache holds at most a
//! fixed number of entries, evicting the oldest insertion first.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Default capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Prefix shared by every cache token.
pub const TOKEN_PREFIX: &str = "img_";

/// A cached image payload.
#[derive(Debug, Clone)]
pub struct CachedImage {
    /// Raw base64 (no data-URI prefix).
    pub base64: Arc<str>,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// File the payload was read from, if any.
    pub original_path: Option<PathBuf>,
    /// Decoded size in bytes.
    pub size_bytes: usize,
    /// Insertion time.
    pub inserted_at: Instant,
}

/// In-memory token → image store with TTL and capacity bounds.
#[derive(Debug)]
pub struct ImageCache {
    entries: Mutex<IndexMap<String, CachedImage>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl ImageCache {
    /// Create a cache with a custom TTL and capacity (at least one entry).
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Store a payload and return its token.
    ///
    /// Expired entries are purged first; if the cache is still full the single
    /// oldest entry is evicted.
    pub fn store(&self, base64: &str, mime_type: &str, source: Option<&Path>) -> String {
        let token = new_token();
        let entry = CachedImage {
            base64: Arc::from(base64),
            mime_type: mime_type.to_string(),
            original_path: source.map(Path::to_path_buf),
            size_bytes: decoded_len(base64),
            inserted_at: Instant::now(),
        };

        let mut entries = self.lock();
        let ttl = self.ttl;
        entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        if entries.len() >= self.max_entries {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                tracing::debug!(token = %evicted, "image cache full, evicted oldest entry");
            }
        }
        entries.insert(token.clone(), entry);
        token
    }

    /// Fetch a payload. Expired entries read as absent.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<CachedImage> {
        let entries = self.lock();
        entries
            .get(token)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .cloned()
    }

    /// Whether a string has the shape of a cache token.
    #[must_use]
    pub fn looks_like_token(value: &str) -> bool {
        value.starts_with(TOKEN_PREFIX)
            && value.len() > TOKEN_PREFIX.len()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    /// Number of entries currently held (expired ones included until swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, CachedImage>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `img_<epochMillis>_<8 hex chars>`.
fn new_token() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{TOKEN_PREFIX}{millis}_{}", &suffix[..8])
}

/// Decoded byte length of a base64 string.
#[must_use]
pub fn decoded_len(base64: &str) -> usize {
    let trimmed = base64.trim_end_matches('=');
    trimmed.len() * 3 / 4
}
