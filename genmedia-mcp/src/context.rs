//! Shared dependencies handed to every tool call.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use genmedia_core::config::DEFAULT_TIMEOUT_SECS;
use genmedia_core::{Catalog, CostTracker, ImageCache, MediaTransport, Settings};

use crate::polling::PollConfig;

/// Everything a tool handler needs, constructed once at startup.
#[derive(Clone)]
pub struct ToolContext {
    /// Model catalog.
    pub catalog: Arc<Catalog>,
    /// Upstream transport.
    pub transport: Arc<dyn MediaTransport>,
    /// Image reference cache.
    pub cache: Arc<ImageCache>,
    /// Cost statistics.
    pub costs: Arc<CostTracker>,
    /// Default directory for generated files.
    pub output_dir: Option<PathBuf>,
    /// Upper bound for any single upstream call.
    pub request_ceiling: Duration,
    /// Job polling cadence.
    pub poll: PollConfig,
    /// Include diagnostic details in error results.
    pub debug: bool,
}

impl ToolContext {
    /// Context with an empty cache, in-memory costs and default limits.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, transport: Arc<dyn MediaTransport>) -> Self {
        Self {
            catalog,
            transport,
            cache: Arc::new(ImageCache::default()),
            costs: Arc::new(CostTracker::new()),
            output_dir: None,
            request_ceiling: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll: PollConfig::default(),
            debug: false,
        }
    }

    /// Apply process settings.
    #[must_use]
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.output_dir.clone_from(&settings.output_dir);
        self.request_ceiling = settings.request_timeout;
        self.debug = settings.debug;
        self
    }

    /// Use a shared cost tracker.
    #[must_use]
    pub fn with_costs(mut self, costs: Arc<CostTracker>) -> Self {
        self.costs = costs;
        self
    }

    /// Use a shared image cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ImageCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Set the default output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set the polling cadence.
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Toggle debug details in error results.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("models", &self.catalog.len())
            .field("cached_images", &self.cache.len())
            .field("output_dir", &self.output_dir)
            .field("request_ceiling", &self.request_ceiling)
            .field("poll", &self.poll)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
