//! Metrics source implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pinion_core::{MetricsSnapshot, Variant};
use thiserror::Error;
use tracing::warn;

/// Errors from a metrics source implementation.
///
/// The bundled sources swallow bad input into empty snapshots instead;
/// the variant exists for sources with real failure modes (network-backed
/// providers).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("metrics source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies one aggregate snapshot per variant.
pub trait MetricsSource {
    fn fetch(
        &self,
        variant: Variant,
    ) -> impl Future<Output = Result<MetricsSnapshot, SourceError>> + Send;
}

/// Fetch both variants' snapshots concurrently.
pub async fn fetch_pair<S: MetricsSource + Sync>(
    source: &S,
) -> Result<(MetricsSnapshot, MetricsSnapshot), SourceError> {
    let (stable, canary) = tokio::join!(
        source.fetch(Variant::Stable),
        source.fetch(Variant::Canary)
    );
    Ok((stable?, canary?))
}

// ── File-backed source ─────────────────────────────────────────────

/// Reads snapshots from a JSON file keyed by variant name:
///
/// ```json
/// { "stable": { "pageviews": 1000, "errors": 20 },
///   "canary": { "pageviews": 100, "errors": 20 } }
/// ```
///
/// This is the CI-facing stand-in for an analytics provider: the pipeline
/// exports the two aggregates into a file and points `pinion evaluate` at
/// it. Unreadable or malformed input maps to an empty snapshot with a
/// warning.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn read_variant(&self, variant: Variant) -> MetricsSnapshot {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "metrics file unreadable; treating as no data"
                );
                return MetricsSnapshot::default();
            }
        };

        let mut by_variant: HashMap<String, MetricsSnapshot> =
            match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "metrics file malformed; treating as no data"
                    );
                    return MetricsSnapshot::default();
                }
            };

        match by_variant.remove(&variant.to_string()) {
            Some(snapshot) => snapshot,
            None => {
                warn!(%variant, "metrics file is missing this variant; treating as no data");
                MetricsSnapshot::default()
            }
        }
    }
}

impl MetricsSource for FileSource {
    async fn fetch(&self, variant: Variant) -> Result<MetricsSnapshot, SourceError> {
        Ok(self.read_variant(variant))
    }
}

// ── Static source ──────────────────────────────────────────────────

/// Fixed snapshots, for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pub stable: MetricsSnapshot,
    pub canary: MetricsSnapshot,
}

impl StaticSource {
    pub fn new(stable: MetricsSnapshot, canary: MetricsSnapshot) -> Self {
        Self { stable, canary }
    }
}

impl MetricsSource for StaticSource {
    async fn fetch(&self, variant: Variant) -> Result<MetricsSnapshot, SourceError> {
        Ok(match variant {
            Variant::Stable => self.stable.clone(),
            Variant::Canary => self.canary.clone(),
        })
    }
}
