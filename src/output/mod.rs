//! Output module for harvest reports
//!
//! This module handles reading statistics back out of the harvest database
//! and rendering them for the `--stats` command.

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};
