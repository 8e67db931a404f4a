//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! roster and post statistics from the storage layer.

use crate::crawler::select_due_accounts;
use crate::model::Account;
use crate::storage::{SqliteStorage, Storage, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Number of stalest accounts listed in the report
const STALEST_LISTED: usize = 5;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Tracked identity the roster belongs to
    pub owner: String,

    /// Accounts on the roster
    pub total_accounts: u64,

    /// Accounts never crawled yet
    pub never_crawled: u64,

    /// Accounts due for the next content cycle
    pub due_accounts: u64,

    /// Accounts whose last attempt failed
    pub errored_accounts: u64,

    /// Last-attempt error text and how many accounts carry it
    pub error_summary: HashMap<String, u64>,

    /// Posts stored across all identities
    pub total_posts: u64,

    /// Posts already delivered downstream for this identity
    pub processed_posts: u64,

    /// Accounts that will be visited first
    pub stalest: Vec<Account>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `owner` - Tracked identity
/// * `now` - Reference time for staleness
/// * `min_hours_between_updates` - Scheduling threshold used to count due accounts
pub fn load_statistics(
    storage: &SqliteStorage,
    owner: &str,
    now: DateTime<Utc>,
    min_hours_between_updates: f64,
) -> StorageResult<HarvestStatistics> {
    let roster = storage.list_accounts(owner)?;

    let mut error_summary = HashMap::new();
    for error in roster.iter().filter_map(|a| a.last_error.as_ref()) {
        *error_summary.entry(error.clone()).or_insert(0) += 1;
    }

    let due = select_due_accounts(&roster, now, min_hours_between_updates, usize::MAX);

    Ok(HarvestStatistics {
        owner: owner.to_string(),
        total_accounts: storage.count_accounts(owner)?,
        never_crawled: roster.iter().filter(|a| a.last_update.is_none()).count() as u64,
        due_accounts: due.len() as u64,
        errored_accounts: storage.count_errored_accounts(owner)?,
        error_summary,
        total_posts: storage.count_posts()?,
        processed_posts: storage.count_processed(owner)?,
        stalest: storage.list_accounts_by_staleness(owner, STALEST_LISTED)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics for @{} ===\n", stats.owner);

    println!("Roster:");
    println!("  Accounts tracked: {}", stats.total_accounts);
    println!("  Never crawled: {}", stats.never_crawled);
    println!("  Due now: {}", stats.due_accounts);
    println!("  Errored on last attempt: {}", stats.errored_accounts);
    println!();

    println!("Posts:");
    println!("  Stored: {}", stats.total_posts);
    println!("  Delivered downstream: {}", stats.processed_posts);
    println!();

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.error_summary.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (error, count) in error_counts {
            println!("  {}: {}", error, count);
        }
        println!();
    }

    if !stats.stalest.is_empty() {
        println!("Next in line:");
        for account in &stats.stalest {
            let last = account
                .last_update
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  @{} (last crawled: {}, posts: {})",
                account.username, last, account.posts_collected
            );
        }
        println!();
    }

    let healthy = stats.total_accounts.saturating_sub(stats.errored_accounts);
    let health_rate = if stats.total_accounts > 0 {
        (healthy as f64 / stats.total_accounts as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Roster Health: {:.1}% ({} / {} accounts without errors)",
        health_rate, healthy, stats.total_accounts
    );
}
