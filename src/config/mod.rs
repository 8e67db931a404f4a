//! Configuration module for Follow-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use follow_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Tracking followings of: {}", config.target.username);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Backoff, BrowserConfig, Config, DiscoveryConfig, ExtractionConfig, IntervalsConfig,
    LimitsConfig, OutputConfig, RetryConfig, TargetConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
