//! Storage traits and error types
//!
//! This module defines the persistence surface the harvester consumes and
//! the associated error type.

use crate::model::{Account, Post, SessionCredential};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write is an upsert keyed by its natural key or an insert guarded by
/// a uniqueness constraint, so concurrent harvesters sharing one database
/// cannot produce duplicate rows.
pub trait Storage {
    // ===== Accounts =====

    /// Inserts an account or refreshes its descriptive fields
    ///
    /// Crawl history (`last_update`, `last_error`, `posts_collected`) of an
    /// existing account is left untouched.
    fn upsert_account(&mut self, owner_id: &str, account: &Account) -> StorageResult<()>;

    /// Lists every account on the roster of `owner_id`
    fn list_accounts(&self, owner_id: &str) -> StorageResult<Vec<Account>>;

    /// Gets a single account
    fn get_account(&self, owner_id: &str, username: &str) -> StorageResult<Option<Account>>;

    /// Records the outcome of a crawl attempt
    ///
    /// `last_update` never moves backwards; `posts_collected` grows by `new_posts`.
    fn record_crawl_attempt(
        &mut self,
        owner_id: &str,
        username: &str,
        at: DateTime<Utc>,
        error: Option<&str>,
        new_posts: u64,
    ) -> StorageResult<()>;

    // ===== Posts =====

    /// Inserts a post or refreshes the metrics of an existing one
    ///
    /// Text and author of a stored post are immutable.
    fn upsert_post(&mut self, owner_id: &str, post: &Post) -> StorageResult<()>;

    /// Gets a post by id
    fn get_post(&self, post_id: &str) -> StorageResult<Option<Post>>;

    // ===== Processed-post ledger =====

    /// Returns true if the post was already handed downstream for `owner_id`
    fn is_post_processed(&self, owner_id: &str, post_id: &str) -> StorageResult<bool>;

    /// Records that the post was handed downstream; repeated calls are no-ops
    fn mark_post_processed(&mut self, owner_id: &str, post_id: &str) -> StorageResult<()>;

    // ===== Sessions =====

    /// Saves (replaces) the credential of a tracked identity
    fn save_credential(&mut self, credential: &SessionCredential) -> StorageResult<()>;

    /// Loads the credential of a tracked identity
    fn load_credential(&self, username: &str) -> StorageResult<Option<SessionCredential>>;

    // ===== Statistics =====

    fn count_accounts(&self, owner_id: &str) -> StorageResult<u64>;

    fn count_errored_accounts(&self, owner_id: &str) -> StorageResult<u64>;

    fn count_posts(&self) -> StorageResult<u64>;

    fn count_processed(&self, owner_id: &str) -> StorageResult<u64>;
}
