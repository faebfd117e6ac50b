//! Client assignment store backed by redb.
//!
//! One JSON blob per client, keyed `{key_prefix}:{client_id}` so several
//! experiments can share a database file. Assignments are write-once in the
//! normal path: `store_if_absent` lets the first writer win and later
//! writers read back the existing record, which is all the coordination
//! concurrent assignment paths need.

use std::path::Path;
use std::sync::Arc;

use pinion_core::Assignment;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Assignment blobs keyed by `{key_prefix}:{client_id}`.
const ASSIGNMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("assignments");

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Client-local persistence for variant assignments.
pub trait AssignmentStore {
    /// Load a client's assignment. A corrupted blob is discarded (returns
    /// `None`) so the caller recreates it; never an error.
    fn load(&self, client_id: &str) -> StoreResult<Option<Assignment>>;

    /// Unconditional write, used by forced/override assignments.
    fn store(&self, client_id: &str, assignment: &Assignment) -> StoreResult<()>;

    /// Write only if no readable record exists; returns the record that is
    /// now persisted (the existing one, or `assignment`).
    fn store_if_absent(&self, client_id: &str, assignment: &Assignment)
    -> StoreResult<Assignment>;
}

/// Thread-safe assignment store backed by redb.
#[derive(Clone)]
pub struct RedbAssignmentStore {
    db: Arc<Database>,
    key_prefix: String,
}

impl RedbAssignmentStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path, key_prefix: &str) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            key_prefix: key_prefix.to_string(),
        };
        store.ensure_table()?;
        debug!(?path, "assignment store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory(key_prefix: &str) -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            key_prefix: key_prefix.to_string(),
        };
        store.ensure_table()?;
        Ok(store)
    }

    fn ensure_table(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn key(&self, client_id: &str) -> String {
        format!("{}:{client_id}", self.key_prefix)
    }

    fn decode(&self, client_id: &str, bytes: &[u8]) -> Option<Assignment> {
        match serde_json::from_slice(bytes) {
            Ok(assignment) => Some(assignment),
            Err(e) => {
                warn!(
                    client_id,
                    error = %e,
                    "discarding unparsable assignment record"
                );
                None
            }
        }
    }
}

impl AssignmentStore for RedbAssignmentStore {
    fn load(&self, client_id: &str) -> StoreResult<Option<Assignment>> {
        let key = self.key(client_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => Ok(self.decode(client_id, guard.value())),
            None => Ok(None),
        }
    }

    fn store(&self, client_id: &str, assignment: &Assignment) -> StoreResult<()> {
        let key = self.key(client_id);
        let value = serde_json::to_vec(assignment).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(client_id, variant = %assignment.variant, "assignment stored");
        Ok(())
    }

    fn store_if_absent(
        &self,
        client_id: &str,
        assignment: &Assignment,
    ) -> StoreResult<Assignment> {
        let key = self.key(client_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let persisted;
        {
            let mut table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;

            let existing = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => self.decode(client_id, guard.value()),
                None => None,
            };

            match existing {
                Some(existing) => persisted = existing,
                None => {
                    let value =
                        serde_json::to_vec(assignment).map_err(map_err!(Serialize))?;
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    persisted = assignment.clone();
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(persisted)
    }
}
