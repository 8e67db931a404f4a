//! Crawler module for roster discovery and timeline harvesting
//!
//! This module contains the core crawling logic, including:
//! - Following-list discovery into the account roster
//! - Staleness-based selection of due accounts
//! - Bounded retry for navigation and reveal steps
//! - Overall cycle orchestration

mod coordinator;
mod discovery;
mod retry;
mod schedule;

pub use coordinator::{classify_inaccessible, CycleResult, Orchestrator, CONTENT_MARKER};
pub use discovery::{extract_accounts, AccountDiscovery, USER_CELL};
pub use retry::RetryPolicy;
pub use schedule::{is_due, select_due_accounts};
