//! Duplicate suppression for downstream handoff
//!
//! A post is checked immediately before it is handed to a downstream
//! collaborator and recorded immediately after the handoff succeeds. The
//! `(owner_id, post_id)` primary key of `processed_posts` keeps the ledger
//! correct even when several harvesters share one database.

use crate::storage::{lock, SharedStorage, Storage, StorageResult};

/// Persisted membership set of posts already delivered downstream
#[derive(Clone)]
pub struct DedupStore {
    storage: SharedStorage,
}

impl DedupStore {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Returns true if `post_id` was already delivered for `owner_id`
    pub fn has(&self, owner_id: &str, post_id: &str) -> StorageResult<bool> {
        lock(&self.storage)?.is_post_processed(owner_id, post_id)
    }

    /// Records a completed handoff
    pub fn record(&self, owner_id: &str, post_id: &str) -> StorageResult<()> {
        lock(&self.storage)?.mark_post_processed(owner_id, post_id)
    }
}
