//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Followed accounts, one roster per tracked identity
CREATE TABLE IF NOT EXISTS accounts (
    owner_id TEXT NOT NULL,
    username TEXT NOT NULL,
    display_name TEXT,
    profile_url TEXT,
    last_update_ms INTEGER,
    last_error TEXT,
    posts_collected INTEGER NOT NULL DEFAULT 0,
    discovered_at TEXT NOT NULL,
    PRIMARY KEY (owner_id, username)
);

CREATE INDEX IF NOT EXISTS idx_accounts_last_update ON accounts(owner_id, last_update_ms);

-- Extracted posts; metrics are refreshed on re-observation
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    id_is_fallback INTEGER NOT NULL DEFAULT 0,
    owner_id TEXT NOT NULL,
    url TEXT,
    posted_at TEXT,
    text TEXT NOT NULL,
    author_username TEXT NOT NULL,
    author_display_name TEXT,
    replies INTEGER,
    retweets INTEGER,
    likes INTEGER,
    views INTEGER,
    first_seen_at TEXT NOT NULL,
    metrics_updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_username);

-- Posts already handed to downstream consumers
CREATE TABLE IF NOT EXISTS processed_posts (
    owner_id TEXT NOT NULL,
    post_id TEXT NOT NULL,
    processed_at TEXT NOT NULL,
    PRIMARY KEY (owner_id, post_id)
);

-- Session cookies of tracked identities
CREATE TABLE IF NOT EXISTS sessions (
    username TEXT PRIMARY KEY,
    credential_data TEXT NOT NULL,
    last_update TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
