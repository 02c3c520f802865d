//! Running-average cost tracking per model.
//!
//! Every completed generation records the credits it consumed. The averages
//! feed cost estimation and, when a path is configured, survive restarts as a
//! JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Observed cost statistics for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostStats {
    /// Mean credits per call.
    pub average: f64,
    /// Cheapest observed call.
    pub min: f64,
    /// Most expensive observed call.
    pub max: f64,
    /// Number of calls recorded.
    pub sample_count: u64,
}

impl CostStats {
    fn first(cost: f64) -> Self {
        Self {
            average: cost,
            min: cost,
            max: cost,
            sample_count: 1,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record(&mut self, cost: f64) {
        self.sample_count += 1;
        self.average += (cost - self.average) / self.sample_count as f64;
        self.min = self.min.min(cost);
        self.max = self.max.max(cost);
    }
}

/// Thread-safe cost tracker with optional JSON persistence.
#[derive(Debug, Default)]
pub struct CostTracker {
    stats: Mutex<BTreeMap<String, CostStats>>,
    path: Option<PathBuf>,
}

impl CostTracker {
    /// In-memory tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker backed by a JSON file, loading existing statistics if present.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Configuration`] if the file exists but cannot be
    /// read or parsed.
    pub fn with_file(path: impl Into<PathBuf>) -> MediaResult<Self> {
        let path = path.into();
        let stats = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                MediaError::Configuration(format!(
                    "cannot read cost file {}: {e}",
                    path.display()
                ))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                MediaError::Configuration(format!(
                    "cost file {} is not valid JSON: {e}",
                    path.display()
                ))
            })?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            stats: Mutex::new(stats),
            path: Some(path),
        })
    }

    /// Record one call's cost. Negative and non-finite values are ignored.
    pub fn record(&self, model_id: &str, cost: f64) {
        if !cost.is_finite() || cost < 0.0 {
            tracing::warn!(model = model_id, cost, "ignoring invalid cost sample");
            return;
        }

        let snapshot = {
            let mut stats = self.lock();
            stats
                .entry(model_id.to_string())
                .and_modify(|s| s.record(cost))
                .or_insert_with(|| CostStats::first(cost));
            self.path.as_ref().map(|_| stats.clone())
        };

        if let (Some(path), Some(snapshot)) = (&self.path, snapshot) {
            if let Err(err) = persist(path, &snapshot) {
                tracing::warn!(path = %path.display(), "failed to persist cost statistics: {err}");
            }
        }
    }

    /// Statistics for one model.
    #[must_use]
    pub fn stats(&self, model_id: &str) -> Option<CostStats> {
        self.lock().get(model_id).copied()
    }

    /// All statistics, ordered by model id.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, CostStats> {
        self.lock().clone()
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CostStats>> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write to a sibling temp file, then rename over the target.
fn persist(path: &Path, stats: &BTreeMap<String, CostStats>) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(stats)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_sample_sets_all_fields() {
        let tracker = CostTracker::new();
        tracker.record("sdxl", 1.5);
        let stats = tracker.stats("sdxl").expect("stats");
        assert_eq!(stats.sample_count, 1);
        assert!((stats.average - 1.5).abs() < 1e-12);
        assert!((stats.min - 1.5).abs() < 1e-12);
        assert!((stats.max - 1.5).abs() < 1e-12);
    }

    #[test]
    fn invalid_samples_are_ignored() {
        let tracker = CostTracker::new();
        tracker.record("sdxl", -1.0);
        tracker.record("sdxl", f64::NAN);
        assert!(tracker.stats("sdxl").is_none());
    }

    #[test]
    fn statistics_survive_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("costs.json");
        {
            let tracker = CostTracker::with_file(&path).expect("tracker");
            tracker.record("dia", 1.0);
            tracker.record("dia", 3.0);
        }
        let reloaded = CostTracker::with_file(&path).expect("reload");
        let stats = reloaded.stats("dia").expect("stats");
        assert_eq!(stats.sample_count, 2);
        assert!((stats.average - 2.0).abs() < 1e-12);
    }

    #[test]
    fn corrupt_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("costs.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(matches!(
            CostTracker::with_file(&path),
            Err(MediaError::Configuration(_))
        ));
    }

    proptest! {
        #[test]
        fn running_stats_match_batch_stats(costs in prop::collection::vec(0.0f64..500.0, 1..64)) {
            let tracker = CostTracker::new();
            for cost in &costs {
                tracker.record("model", *cost);
            }
            let stats = tracker.stats("model").expect("stats");

            #[allow(clippy::cast_precision_loss)]
            let mean = costs.iter().sum::<f64>() / costs.len() as f64;
            let min = costs.iter().copied().fold(f64::INFINITY, f64::min);
            let max = costs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            prop_assert!((stats.average - mean).abs() < 1e-9 * mean.max(1.0));
            prop_assert_eq!(stats.min, min);
            prop_assert_eq!(stats.max, max);
            prop_assert_eq!(stats.sample_count, costs.len() as u64);
        }
    }
}
