//! Rollout document store with optimistic concurrency.
//!
//! `load` returns the document together with a version fingerprint; `store`
//! only writes if the on-disk version still matches. Concurrent automation
//! runs racing on the same document get a `Conflict` and replay their pure
//! read-modify-write through [`update_with_retry`].

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::document::RolloutDocument;
use crate::error::{StoreError, StoreResult};

/// Version fingerprint of an absent document.
pub const NO_VERSION: u64 = 0;

/// A loaded document plus the version fingerprint to CAS against.
///
/// `document` is `None` when the file is absent *or* unparsable — a
/// corrupted document is discarded and recreated from defaults by the
/// caller, not treated as fatal. The version still reflects what is on
/// disk so the recreating write wins the CAS.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Option<RolloutDocument>,
    pub version: u64,
}

/// Versioned read-modify-write interface for the rollout document.
pub trait DocumentStore {
    fn load(&self) -> StoreResult<LoadedDocument>;

    /// Write `document` iff the current version equals `expected_version`
    /// (`NO_VERSION` for "expect absent"). Returns the new version.
    fn store(&self, document: &RolloutDocument, expected_version: u64) -> StoreResult<u64>;
}

/// Run a read-modify-write against the store, retrying on version
/// conflicts up to `max_attempts` times.
///
/// The closure must be pure in the loaded document — it is replayed from a
/// fresh read on every conflict, which is exactly why the controller's
/// `step` never mutates its input.
pub fn update_with_retry<S, F>(store: &S, max_attempts: u32, mut f: F) -> StoreResult<RolloutDocument>
where
    S: DocumentStore + ?Sized,
    F: FnMut(Option<RolloutDocument>) -> RolloutDocument,
{
    for attempt in 1..=max_attempts {
        let loaded = store.load()?;
        let next = f(loaded.document);
        match store.store(&next, loaded.version) {
            Ok(_) => return Ok(next),
            Err(StoreError::Conflict) => {
                debug!(attempt, max_attempts, "document version conflict, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(StoreError::RetriesExhausted(max_attempts))
}

// ── File-backed store ──────────────────────────────────────────────

/// JSON-file document store.
///
/// Writes go through a temp file in the same directory followed by a
/// rename, so readers never observe a half-written document. The
/// version check and the rename are not one atomic step across
/// processes; the bounded retry in [`update_with_retry`] absorbs the
/// rare lost race.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    path: PathBuf,
}

impl FileDocumentStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current_version(&self) -> StoreResult<u64> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(fingerprint(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NO_VERSION),
            Err(e) => Err(StoreError::Read(e.to_string())),
        }
    }
}

impl DocumentStore for FileDocumentStore {
    fn load(&self) -> StoreResult<LoadedDocument> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedDocument {
                    document: None,
                    version: NO_VERSION,
                });
            }
            Err(e) => return Err(StoreError::Read(e.to_string())),
        };

        let version = fingerprint(&bytes);
        let document = match serde_json::from_slice(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "discarding unparsable rollout document"
                );
                None
            }
        };
        Ok(LoadedDocument { document, version })
    }

    fn store(&self, document: &RolloutDocument, expected_version: u64) -> StoreResult<u64> {
        if self.current_version()? != expected_version {
            return Err(StoreError::Conflict);
        }

        let mut bytes =
            serde_json::to_vec_pretty(document).map_err(|e| StoreError::Serialize(e.to_string()))?;
        bytes.push(b'\n');

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| StoreError::Write(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Write(e.to_string()))?;

        debug!(path = %self.path.display(), "rollout document stored");
        Ok(fingerprint(&bytes))
    }
}

// ── In-memory store ────────────────────────────────────────────────

/// In-memory document store for tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    document: Option<RolloutDocument>,
    version: u64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load(&self) -> StoreResult<LoadedDocument> {
        let inner = self.inner.lock().expect("document store lock poisoned");
        Ok(LoadedDocument {
            document: inner.document.clone(),
            version: inner.version,
        })
    }

    fn store(&self, document: &RolloutDocument, expected_version: u64) -> StoreResult<u64> {
        let mut inner = self.inner.lock().expect("document store lock poisoned");
        if inner.version != expected_version {
            return Err(StoreError::Conflict);
        }
        inner.document = Some(document.clone());
        inner.version += 1;
        Ok(inner.version)
    }
}

/// Content fingerprint used as the CAS version. Never collides with
/// [`NO_VERSION`].
fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Distribution, UpdateSource};
    use pinion_core::RolloutStatus;

    fn doc(percentage: f64) -> RolloutDocument {
        RolloutDocument {
            distribution: Distribution {
                canary_percentage: percentage,
                max_percentage: 50.0,
                safety_threshold: 2.0,
                status: RolloutStatus::Active,
                last_evaluation_date: None,
                last_evaluation_result: None,
            },
            last_updated: 1000,
            update_source: UpdateSource::Automated,
        }
    }

    // ── File store ─────────────────────────────────────────────────

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(&dir.path().join("rollout.json"));

        let loaded = store.load().unwrap();
        assert!(loaded.document.is_none());
        assert_eq!(loaded.version, NO_VERSION);

        store.store(&doc(10.0), NO_VERSION).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.document.unwrap(), doc(10.0));
        assert_ne!(loaded.version, NO_VERSION);
    }

    #[test]
    fn file_store_detects_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(&dir.path().join("rollout.json"));

        let v1 = store.store(&doc(10.0), NO_VERSION).unwrap();
        // Another writer moves the document.
        store.store(&doc(20.0), v1).unwrap();

        // A store against the stale version must fail.
        assert!(matches!(
            store.store(&doc(30.0), v1),
            Err(StoreError::Conflict)
        ));
        // And against NO_VERSION (expect absent) too.
        assert!(matches!(
            store.store(&doc(30.0), NO_VERSION),
            Err(StoreError::Conflict)
        ));
    }

    #[test]
    fn corrupted_file_is_discarded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollout.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileDocumentStore::new(&path);
        let loaded = store.load().unwrap();
        assert!(loaded.document.is_none());
        // The version tracks the corrupt bytes, so a recreating write wins.
        assert_ne!(loaded.version, NO_VERSION);

        store.store(&doc(5.0), loaded.version).unwrap();
        assert_eq!(store.load().unwrap().document.unwrap(), doc(5.0));
    }

    #[test]
    fn file_is_valid_json_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollout.json");
        let store = FileDocumentStore::new(&path);
        store.store(&doc(10.0), NO_VERSION).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("canaryPercentage"));
        assert!(raw.ends_with('\n'));
    }

    // ── Memory store ───────────────────────────────────────────────

    #[test]
    fn memory_store_versions_monotonically() {
        let store = MemoryDocumentStore::new();
        let v1 = store.store(&doc(10.0), NO_VERSION).unwrap();
        let v2 = store.store(&doc(20.0), v1).unwrap();
        assert!(v2 > v1);
        assert!(matches!(
            store.store(&doc(30.0), v1),
            Err(StoreError::Conflict)
        ));
    }

    // ── Retry loop ─────────────────────────────────────────────────

    #[test]
    fn update_with_retry_creates_when_absent() {
        let store = MemoryDocumentStore::new();
        let written = update_with_retry(&store, 3, |current| {
            assert!(current.is_none());
            doc(5.0)
        })
        .unwrap();
        assert_eq!(written, doc(5.0));
        assert_eq!(store.load().unwrap().document.unwrap(), doc(5.0));
    }

    #[test]
    fn update_with_retry_replays_on_conflict() {
        let store = MemoryDocumentStore::new();
        store.store(&doc(10.0), NO_VERSION).unwrap();

        let mut calls = 0;
        let result = update_with_retry(&store, 3, |current| {
            calls += 1;
            if calls == 1 {
                // Simulate a concurrent writer sneaking in between our
                // read and our write.
                let v = store.load().unwrap().version;
                store.store(&doc(99.0), v).unwrap();
            }
            let mut next = current.unwrap();
            next.distribution.canary_percentage += 1.0;
            next
        })
        .unwrap();

        assert_eq!(calls, 2);
        // The replay saw the concurrent write (99.0), not the stale 10.0.
        assert_eq!(result.distribution.canary_percentage, 100.0);
    }

    #[test]
    fn update_with_retry_gives_up_eventually() {
        let store = MemoryDocumentStore::new();
        store.store(&doc(10.0), NO_VERSION).unwrap();

        let result = update_with_retry(&store, 2, |current| {
            // A pathological rival that always wins the race.
            let v = store.load().unwrap().version;
            store.store(&doc(0.0), v).unwrap();
            current.unwrap()
        });
        assert!(matches!(result, Err(StoreError::RetriesExhausted(2))));
    }
}
