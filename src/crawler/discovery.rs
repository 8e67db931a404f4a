//! Following-list discovery
//!
//! Walks the tracked identity's following list, revealing more entries until
//! the roster cap is reached or the list stops growing, and upserts every
//! account found. Existing accounts keep their crawl history.

use crate::browser::{DriverError, PageDriver, PageSnapshot};
use crate::config::Config;
use crate::crawler::RetryPolicy;
use crate::model::Account;
use crate::session::SessionManager;
use crate::storage::{self, SharedStorage, Storage};
use crate::{HarvestError, Result};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Marker of one entry in the following list
pub const USER_CELL: &str = r#"[data-testid="UserCell"]"#;

static RE_PROFILE_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://[^/]+)?/([A-Za-z0-9_]{1,15})/?$").expect("valid profile href regex")
});

/// Top-level site paths that look like handles but are not accounts
const RESERVED_PATHS: [&str; 9] = [
    "home",
    "explore",
    "notifications",
    "messages",
    "search",
    "settings",
    "i",
    "login",
    "compose",
];

/// One discovery pass over the tracked identity's following list
#[derive(Debug, Clone)]
pub struct AccountDiscovery {
    owner: String,
    site_url: String,
    max_accounts: usize,
    max_no_change_attempts: u32,
    content_wait: Duration,
    retry: RetryPolicy,
}

impl AccountDiscovery {
    pub fn new(config: &Config) -> Self {
        Self {
            owner: config.target.username.clone(),
            site_url: config.browser.site_url.trim_end_matches('/').to_string(),
            max_accounts: config.limits.max_accounts,
            max_no_change_attempts: config.discovery.max_no_change_attempts,
            content_wait: Duration::from_millis(config.browser.content_wait_ms),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    pub fn following_url(&self) -> String {
        format!("{}/{}/following", self.site_url, self.owner)
    }

    /// Collects the roster, persists it and refreshes the stored session
    ///
    /// The driver must already carry the session credentials. Cancellation
    /// stops the reveal loop; accounts seen so far are still persisted.
    pub async fn run(
        &self,
        driver: &mut dyn PageDriver,
        session: &SessionManager,
        storage: &SharedStorage,
        cancel: &CancellationToken,
    ) -> Result<Vec<Account>> {
        let url = self.following_url();
        let landing = self.retry.navigate(driver, &url).await.map_err(|e| match e {
            DriverError::Timeout { url } => HarvestError::NavigationTimeout { url },
            other => HarvestError::Driver(other),
        })?;
        ensure_authenticated(&landing)?;

        let Some(first) = driver.wait_for_selector(USER_CELL, self.content_wait).await? else {
            ensure_authenticated(&driver.snapshot().await?)?;
            tracing::info!("Following list of @{} rendered no accounts", self.owner);
            return Ok(Vec::new());
        };

        let roster = self.collect(driver, first, cancel).await?;

        {
            let mut store = storage::lock(storage)?;
            for account in &roster {
                store.upsert_account(&self.owner, account)?;
            }
        }

        session.refresh(driver)?;

        tracing::info!("Discovered {} followed account(s) for @{}", roster.len(), self.owner);
        Ok(roster)
    }

    async fn collect(
        &self,
        driver: &mut dyn PageDriver,
        first: PageSnapshot,
        cancel: &CancellationToken,
    ) -> Result<Vec<Account>> {
        let mut seen = HashSet::new();
        let mut roster = Vec::new();
        merge_new(&mut seen, &mut roster, extract_accounts(&first.html, &self.site_url));

        let mut no_change = 0;
        while roster.len() < self.max_accounts && no_change < self.max_no_change_attempts {
            if cancel.is_cancelled() {
                tracing::info!("Discovery cancelled with {} account(s) collected", roster.len());
                break;
            }

            let snapshot = match self.retry.reveal_more(driver).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("Following list reveal failed with {} accounts: {}", roster.len(), e);
                    break;
                }
            };

            let added = merge_new(&mut seen, &mut roster, extract_accounts(&snapshot.html, &self.site_url));
            tracing::debug!(added, total = roster.len(), "Following list reveal");
            no_change = if added == 0 { no_change + 1 } else { 0 };
        }

        roster.truncate(self.max_accounts);
        Ok(roster)
    }
}

fn ensure_authenticated(snapshot: &PageSnapshot) -> Result<()> {
    if SessionManager::detect_invalidated(snapshot) {
        return Err(HarvestError::Authentication(format!(
            "login wall at {}",
            snapshot.url
        )));
    }
    Ok(())
}

fn merge_new(seen: &mut HashSet<String>, roster: &mut Vec<Account>, batch: Vec<Account>) -> usize {
    let before = roster.len();
    roster.extend(batch.into_iter().filter(|a| seen.insert(a.username.to_lowercase())));
    roster.len() - before
}

/// Reads every account cell of a rendered following list
pub fn extract_accounts(html: &str, site_url: &str) -> Vec<Account> {
    let document = Html::parse_document(html);
    let (Ok(cells), Ok(links), Ok(spans)) = (
        Selector::parse(USER_CELL),
        Selector::parse("a[href]"),
        Selector::parse("span"),
    ) else {
        return Vec::new();
    };

    document
        .select(&cells)
        .filter_map(|cell| {
            let username = cell
                .select(&links)
                .filter_map(|a| a.value().attr("href"))
                .find_map(profile_username)?;

            let display_name = cell
                .select(&spans)
                .map(|s| s.text().collect::<String>().trim().to_string())
                .find(|t| !t.is_empty() && !t.starts_with('@'));

            let profile_url = format!("{}/{}", site_url.trim_end_matches('/'), username);
            Some(Account::discovered(username, display_name, Some(profile_url)))
        })
        .collect()
}

fn profile_username(href: &str) -> Option<String> {
    let caps = RE_PROFILE_HREF.captures(href)?;
    let name = &caps[1];
    if RESERVED_PATHS.contains(&name.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(name.to_string())
}
