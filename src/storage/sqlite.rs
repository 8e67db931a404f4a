//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{Account, Author, Credential, Metrics, Post, PostId, SessionCredential};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database file at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Returns the roster of `owner_id`, stalest first (never-updated accounts lead)
    pub fn list_accounts_by_staleness(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<Account>> {
        let mut stmt = self.conn.prepare(
            "SELECT username, display_name, profile_url, last_update_ms, last_error, posts_collected
             FROM accounts WHERE owner_id = ?1
             ORDER BY last_update_ms IS NOT NULL, last_update_ms ASC, username ASC
             LIMIT ?2",
        )?;

        let accounts = stmt
            .query_map(params![owner_id, limit as i64], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(accounts)
    }
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let last_update_ms: Option<i64> = row.get(3)?;
    let posts_collected: i64 = row.get(5)?;
    Ok(Account {
        username: row.get(0)?,
        display_name: row.get(1)?,
        profile_url: row.get(2)?,
        last_update: last_update_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        last_error: row.get(4)?,
        posts_collected: posts_collected.max(0) as u64,
    })
}

fn metric_to_db(value: Option<u64>) -> Option<i64> {
    value.map(|v| v.min(i64::MAX as u64) as i64)
}

fn metric_from_db(value: Option<i64>) -> Option<u64> {
    value.map(|v| v.max(0) as u64)
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl Storage for SqliteStorage {
    // ===== Accounts =====

    fn upsert_account(&mut self, owner_id: &str, account: &Account) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO accounts (owner_id, username, display_name, profile_url, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(owner_id, username) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, accounts.display_name),
                profile_url = COALESCE(excluded.profile_url, accounts.profile_url)",
            params![
                owner_id,
                account.username,
                account.display_name,
                account.profile_url,
                now
            ],
        )?;
        Ok(())
    }

    fn list_accounts(&self, owner_id: &str) -> StorageResult<Vec<Account>> {
        let mut stmt = self.conn.prepare(
            "SELECT username, display_name, profile_url, last_update_ms, last_error, posts_collected
             FROM accounts WHERE owner_id = ?1 ORDER BY username",
        )?;

        let accounts = stmt
            .query_map(params![owner_id], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    fn get_account(&self, owner_id: &str, username: &str) -> StorageResult<Option<Account>> {
        let account = self
            .conn
            .query_row(
                "SELECT username, display_name, profile_url, last_update_ms, last_error, posts_collected
                 FROM accounts WHERE owner_id = ?1 AND username = ?2",
                params![owner_id, username],
                account_from_row,
            )
            .optional()?;

        Ok(account)
    }

    fn record_crawl_attempt(
        &mut self,
        owner_id: &str,
        username: &str,
        at: DateTime<Utc>,
        error: Option<&str>,
        new_posts: u64,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE accounts SET
                last_update_ms = MAX(COALESCE(last_update_ms, ?3), ?3),
                last_error = ?4,
                posts_collected = posts_collected + ?5
             WHERE owner_id = ?1 AND username = ?2",
            params![
                owner_id,
                username,
                at.timestamp_millis(),
                error,
                new_posts.min(i64::MAX as u64) as i64
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::Database(format!(
                "account {} is not on the roster of {}",
                username, owner_id
            )));
        }

        Ok(())
    }

    // ===== Posts =====

    fn upsert_post(&mut self, owner_id: &str, post: &Post) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO posts (id, id_is_fallback, owner_id, url, posted_at, text,
                author_username, author_display_name, replies, retweets, likes, views,
                first_seen_at, metrics_updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
             ON CONFLICT(id) DO UPDATE SET
                replies = COALESCE(excluded.replies, posts.replies),
                retweets = COALESCE(excluded.retweets, posts.retweets),
                likes = COALESCE(excluded.likes, posts.likes),
                views = COALESCE(excluded.views, posts.views),
                metrics_updated_at = excluded.metrics_updated_at",
            params![
                post.id.as_str(),
                post.id.is_fallback(),
                owner_id,
                post.url,
                post.timestamp.map(|t| t.to_rfc3339()),
                post.text,
                post.author.username,
                post.author.display_name,
                metric_to_db(post.metrics.replies),
                metric_to_db(post.metrics.retweets),
                metric_to_db(post.metrics.likes),
                metric_to_db(post.metrics.views),
                now
            ],
        )?;
        Ok(())
    }

    fn get_post(&self, post_id: &str) -> StorageResult<Option<Post>> {
        let post = self
            .conn
            .query_row(
                "SELECT id, id_is_fallback, url, posted_at, text, author_username,
                    author_display_name, replies, retweets, likes, views
                 FROM posts WHERE id = ?1",
                params![post_id],
                |row| {
                    let id: String = row.get(0)?;
                    let is_fallback: bool = row.get(1)?;
                    Ok(Post {
                        id: PostId::from_stored(&id, is_fallback),
                        url: row.get(2)?,
                        timestamp: parse_timestamp(row.get(3)?),
                        text: row.get(4)?,
                        author: Author {
                            username: row.get(5)?,
                            display_name: row.get(6)?,
                        },
                        metrics: Metrics {
                            replies: metric_from_db(row.get(7)?),
                            retweets: metric_from_db(row.get(8)?),
                            likes: metric_from_db(row.get(9)?),
                            views: metric_from_db(row.get(10)?),
                        },
                    })
                },
            )
            .optional()?;

        Ok(post)
    }

    // ===== Processed-post ledger =====

    fn is_post_processed(&self, owner_id: &str, post_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM processed_posts WHERE owner_id = ?1 AND post_id = ?2",
                params![owner_id, post_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_post_processed(&mut self, owner_id: &str, post_id: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO processed_posts (owner_id, post_id, processed_at) VALUES (?1, ?2, ?3)",
            params![owner_id, post_id, now],
        )?;
        Ok(())
    }

    // ===== Sessions =====

    fn save_credential(&mut self, credential: &SessionCredential) -> StorageResult<()> {
        let data = serde_json::to_string(&credential.credential_data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO sessions (username, credential_data, last_update) VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO UPDATE SET
                credential_data = excluded.credential_data,
                last_update = excluded.last_update",
            params![
                credential.username,
                data,
                credential.last_update.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn load_credential(&self, username: &str) -> StorageResult<Option<SessionCredential>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT credential_data, last_update FROM sessions WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((data, last_update)) = row else {
            return Ok(None);
        };

        let credential_data: Vec<Credential> = serde_json::from_str(&data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Some(SessionCredential {
            username: username.to_string(),
            credential_data,
            last_update: parse_timestamp(Some(last_update)).unwrap_or_else(Utc::now),
        }))
    }

    // ===== Statistics =====

    fn count_accounts(&self, owner_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_errored_accounts(&self, owner_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE owner_id = ?1 AND last_error IS NOT NULL",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_posts(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_processed(&self, owner_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processed_posts WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
