//! Follow-Harvester: a roster crawler for rendered social timelines
//!
//! This crate keeps a roster of followed accounts for one tracked identity,
//! revisits the stalest of them on a schedule, extracts posts from rendered
//! timeline markup and hands each new post downstream exactly once.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod events;
pub mod extract;
pub mod model;
pub mod output;
pub mod session;
pub mod storage;

use thiserror::Error;

/// Main error type for Follow-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication required: {0}")]
    Authentication(String),

    #[error("Navigation timeout for {url}")]
    NavigationTimeout { url: String },

    #[error("Account {username} not accessible: {kind}")]
    InaccessibleAccount {
        username: String,
        kind: model::InaccessibleKind,
    },

    #[error("Could not resolve a post identity: {0}")]
    ExtractionAmbiguity(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] storage::StorageError),

    #[error("Browser error: {0}")]
    Driver(#[from] browser::DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cycle cancelled")]
    Cancelled,
}

impl HarvestError {
    /// Returns true if this error must stop the whole cycle rather than a single account
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::Persistence(_) | Self::Cancelled
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Follow-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{select_due_accounts, CycleResult, Orchestrator};
pub use extract::{parse_metric, ContentExtractor};
pub use model::{Account, Post, PostId};
