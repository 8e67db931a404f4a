//! Staleness-based selection of the accounts due in a cycle

use crate::model::Account;
use chrono::{DateTime, Utc};

/// Returns true if `account` should be crawled at `now`
///
/// Never-crawled accounts are always due.
pub fn is_due(account: &Account, now: DateTime<Utc>, min_hours_between_updates: f64) -> bool {
    match account.hours_since_update(now) {
        None => true,
        Some(hours) => hours >= min_hours_between_updates,
    }
}

/// Selects the accounts to crawl this cycle, stalest first
///
/// Accounts never crawled sort before everything else; accounts left out by
/// the cap stay due and sort to the front of the next cycle.
///
/// # Arguments
///
/// * `accounts` - The full roster
/// * `now` - Reference time for staleness
/// * `min_hours_between_updates` - Minimum staleness before an account is due
/// * `max_accounts_per_cycle` - Cap on the returned set
pub fn select_due_accounts(
    accounts: &[Account],
    now: DateTime<Utc>,
    min_hours_between_updates: f64,
    max_accounts_per_cycle: usize,
) -> Vec<Account> {
    let mut due: Vec<Account> = accounts
        .iter()
        .filter(|a| is_due(a, now, min_hours_between_updates))
        .cloned()
        .collect();

    // Option orders None first; ties keep roster order
    due.sort_by_key(|a| a.last_update);
    due.truncate(max_accounts_per_cycle);
    due
}
