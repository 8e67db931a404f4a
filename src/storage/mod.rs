//! Storage module for persisting harvest state
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Account roster upserts and crawl-attempt bookkeeping
//! - Post upserts with metric refresh
//! - The processed-post ledger used for duplicate suppression
//! - Session credential persistence

mod dedup;
mod schema;
mod sqlite;
mod traits;

pub use dedup::DedupStore;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between the orchestrator, discovery and sessions
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens (or creates) the database at `path` as a shared handle
pub fn open_shared(path: &Path) -> StorageResult<SharedStorage> {
    Ok(Arc::new(Mutex::new(SqliteStorage::new(path)?)))
}

/// Locks a shared storage handle, surfacing lock poisoning as a storage error
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
}
