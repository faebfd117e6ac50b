//! pinion-state — persistence for the Pinion rollout engine.
//!
//! Two stores live here:
//!
//! - The **rollout document store**: a single JSON document holding the
//!   current percentage, status, and last evaluation. Reads hand back a
//!   version fingerprint; writes are compare-and-swap against it, so
//!   concurrent automation runs resolve via bounded retry instead of
//!   lost updates ([`update_with_retry`]).
//! - The **assignment store**: one JSON blob per client under a
//!   configurable key prefix, backed by [redb](https://docs.rs/redb).
//!   Assignments are idempotent once created, so first writer wins and
//!   no locking is needed.
//!
//! Corrupted persisted data is a recoverable condition in both stores:
//! discard, warn, and let the caller recreate from defaults.

pub mod assignments;
pub mod document;
pub mod error;
pub mod store;

pub use assignments::{AssignmentStore, RedbAssignmentStore};
pub use document::{Distribution, RolloutDocument, UpdateSource};
pub use error::{StoreError, StoreResult};
pub use store::{
    DocumentStore, FileDocumentStore, LoadedDocument, MemoryDocumentStore, update_with_retry,
};
