//! Crawl orchestration
//!
//! The [`Orchestrator`] owns the single page driver of a harvester instance
//! and runs the two cycles over it:
//! - discovery, which refreshes the roster from the following list
//! - content, which visits the due accounts one at a time, extracts their
//!   posts, persists them and announces the ones never delivered before
//!
//! The driver sits behind an async mutex, so the two cycles never interleave
//! navigation on the same session.

use crate::browser::{DriverError, PageDriver, PageSnapshot};
use crate::config::Config;
use crate::crawler::discovery::AccountDiscovery;
use crate::crawler::schedule::select_due_accounts;
use crate::crawler::RetryPolicy;
use crate::events::{EventSink, HarvestEvent};
use crate::extract::{harvest_feed, ContentExtractor, ScrollSettings};
use crate::model::{InaccessibleKind, Post, ACCOUNT_NOT_ACCESSIBLE};
use crate::session::SessionManager;
use crate::storage::{self, DedupStore, SharedStorage, Storage, StorageError};
use crate::{HarvestError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Elements that mark a rendered timeline
pub const CONTENT_MARKER: &str =
    r#"article[data-testid="tweet"], [data-testid="cellInnerDiv"], [data-testid="tweetText"]"#;

/// Subtrees holding post content, which never count as terminal markers
const POST_SUBTREES: &str = r#"article, [data-testid="tweetText"]"#;

/// Page text shown instead of a timeline, by classification
const TERMINAL_MARKERS: [(&str, InaccessibleKind); 6] = [
    ("Account suspended", InaccessibleKind::Suspended),
    ("These posts are protected", InaccessibleKind::Protected),
    ("These Tweets are protected", InaccessibleKind::Protected),
    ("This account doesn't exist", InaccessibleKind::NotFound),
    ("This account doesn\u{2019}t exist", InaccessibleKind::NotFound),
    ("Hmm...this page doesn't exist", InaccessibleKind::NotFound),
];

/// Summary of one content cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleResult {
    pub accounts_attempted: usize,
    pub accounts_succeeded: usize,
    pub accounts_errored: usize,
    /// Posts delivered downstream for the first time
    pub posts_found: usize,
}

/// What a visit to one account timeline produced
enum Visit {
    Posts(Vec<Post>),
    NoPostsFound,
}

/// Outcome of one account within a cycle
struct AccountOutcome {
    error: Option<String>,
    new_posts: usize,
}

/// Drives discovery and content cycles for one tracked identity
pub struct Orchestrator {
    config: Arc<Config>,
    storage: SharedStorage,
    driver: Mutex<Box<dyn PageDriver>>,
    session: SessionManager,
    dedup: DedupStore,
    events: Arc<dyn EventSink>,
    extractor: ContentExtractor,
    discovery: AccountDiscovery,
    retry: RetryPolicy,
}

impl Orchestrator {
    /// Creates an orchestrator over an opened store and a page driver
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `storage` - Shared handle to the harvest database
    /// * `driver` - The single browser-equivalent session used by both cycles
    /// * `events` - Receiver of every emitted event
    pub fn new(
        config: Config,
        storage: SharedStorage,
        driver: Box<dyn PageDriver>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let extractor = ContentExtractor::new(
            &config.extraction,
            &config.browser.site_url,
            config.limits.max_posts_per_account,
        );

        Self {
            session: SessionManager::new(storage.clone(), config.target.username.clone()),
            dedup: DedupStore::new(storage.clone()),
            discovery: AccountDiscovery::new(&config),
            retry: RetryPolicy::from_config(&config.retry),
            config: Arc::new(config),
            storage,
            driver: Mutex::new(driver),
            events,
            extractor,
        }
    }

    fn owner(&self) -> &str {
        &self.config.target.username
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Refreshes the roster from the following list
    ///
    /// Returns the number of accounts found in this pass. Cancellation is
    /// honored between reveals.
    pub async fn run_discovery(&self, cancel: &CancellationToken) -> Result<usize> {
        let mut driver = self.driver.lock().await;
        tracing::info!("Starting discovery for @{}", self.owner());

        let result = match self.session.authenticate(&mut **driver).await {
            Ok(_) => {
                self.discovery
                    .run(&mut **driver, &self.session, &self.storage, cancel)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(roster) => {
                self.events.emit(HarvestEvent::FollowingsUpdated {
                    count: roster.len(),
                });
                Ok(roster.len())
            }
            Err(e) => {
                self.fail_cycle("discovery", &e);
                Err(e)
            }
        }
    }

    /// Visits every due account once, in staleness order
    ///
    /// Per-account failures are recorded on the account and the cycle moves
    /// on. Authentication failures and repeated persistence failures abort the
    /// cycle. Cancellation is honored between accounts.
    pub async fn run_content_cycle(&self, cancel: &CancellationToken) -> Result<CycleResult> {
        let mut driver = self.driver.lock().await;

        if let Err(e) = self.session.authenticate(&mut **driver).await {
            self.fail_cycle("content", &e);
            return Err(e);
        }

        let now = Utc::now();
        let roster = storage::lock(&self.storage)?.list_accounts(self.owner())?;
        let due = select_due_accounts(
            &roster,
            now,
            self.config.limits.min_hours_between_updates,
            self.config.limits.max_accounts_per_cycle,
        );
        tracing::info!(
            "Starting content cycle: {} of {} account(s) due",
            due.len(),
            roster.len()
        );

        let mut result = CycleResult::default();
        let mut persistence_failures = 0u32;

        for account in &due {
            if cancel.is_cancelled() {
                tracing::info!("Content cycle cancelled after {} account(s)", result.accounts_attempted);
                break;
            }

            let outcome = match self
                .crawl_account(&mut **driver, &account.username, &mut persistence_failures)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.fail_cycle("content", &e);
                    return Err(e);
                }
            };

            result.accounts_attempted += 1;
            result.posts_found += outcome.new_posts;
            if outcome.error.is_some() {
                result.accounts_errored += 1;
            } else {
                result.accounts_succeeded += 1;
            }
        }

        self.events.emit(HarvestEvent::ContentUpdated {
            processed_account_count: result.accounts_attempted,
        });
        tracing::info!(
            "Content cycle finished: {} attempted, {} succeeded, {} errored, {} new post(s)",
            result.accounts_attempted,
            result.accounts_succeeded,
            result.accounts_errored,
            result.posts_found
        );

        Ok(result)
    }

    /// Runs discovery and content cycles on their cadences until cancelled
    pub async fn run_forever(&self, cancel: CancellationToken) -> Result<()> {
        let mut discovery = tokio::time::interval(self.config.intervals.following_update());
        let mut content = tokio::time::interval(self.config.intervals.content_fetch());
        discovery.set_missed_tick_behavior(MissedTickBehavior::Delay);
        content.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Biased so the roster is refreshed before the first content cycle
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = discovery.tick() => {
                    if let Err(e) = self.run_discovery(&cancel).await {
                        tracing::warn!("Discovery cycle failed: {}", e);
                    }
                }
                _ = content.tick() => {
                    if let Err(e) = self.run_content_cycle(&cancel).await {
                        tracing::warn!("Content cycle failed: {}", e);
                    }
                }
            }
        }

        tracing::info!("Harvester stopped");
        Ok(())
    }

    /// Visits one account and records the attempt, whatever its outcome
    async fn crawl_account(
        &self,
        driver: &mut dyn PageDriver,
        username: &str,
        persistence_failures: &mut u32,
    ) -> Result<AccountOutcome> {
        tracing::debug!(account = %username, "Visiting account");

        let (error, new_posts) = match self.visit_account(driver, username).await {
            Ok(Visit::Posts(posts)) => {
                let new_posts = match self.deliver_posts(username, &posts, persistence_failures) {
                    Ok(new_posts) => new_posts,
                    Err(e) => {
                        if let Err(record) = self.record_attempt(username, Some(&e.to_string()), 0) {
                            tracing::error!(account = %username, "Could not record attempt: {}", record);
                        }
                        return Err(e);
                    }
                };
                tracing::info!(
                    account = %username,
                    "Extracted {} post(s), {} new",
                    posts.len(),
                    new_posts
                );
                (None, new_posts)
            }
            Ok(Visit::NoPostsFound) => {
                tracing::info!(account = %username, "No posts found");
                (None, 0)
            }
            Err(e) if e.is_cycle_fatal() => return Err(e),
            Err(HarvestError::InaccessibleAccount { kind, .. }) => {
                tracing::warn!(account = %username, "Account not accessible ({})", kind);
                self.events.emit(HarvestEvent::CrawlError {
                    account: username.to_string(),
                    reason: ACCOUNT_NOT_ACCESSIBLE.to_string(),
                    inaccessible: Some(kind),
                });
                (Some(ACCOUNT_NOT_ACCESSIBLE.to_string()), 0)
            }
            Err(e) => {
                tracing::warn!(account = %username, "Crawl failed: {}", e);
                self.events.emit(HarvestEvent::CrawlError {
                    account: username.to_string(),
                    reason: e.to_string(),
                    inaccessible: None,
                });
                (Some(e.to_string()), 0)
            }
        };

        if let Err(e) = self.record_attempt(username, error.as_deref(), new_posts) {
            self.persistence_failed(username, e, persistence_failures)?;
        }

        Ok(AccountOutcome { error, new_posts })
    }

    fn record_attempt(
        &self,
        username: &str,
        error: Option<&str>,
        new_posts: usize,
    ) -> storage::StorageResult<()> {
        storage::lock(&self.storage).and_then(|mut store| {
            store.record_crawl_attempt(self.owner(), username, Utc::now(), error, new_posts as u64)
        })
    }

    /// Navigates to the account and extracts its timeline
    async fn visit_account(&self, driver: &mut dyn PageDriver, username: &str) -> Result<Visit> {
        let url = format!(
            "{}/{}",
            self.config.browser.site_url.trim_end_matches('/'),
            username
        );

        let landing = self.retry.navigate(driver, &url).await.map_err(navigation_error)?;
        check_landing(&landing, username)?;

        let wait = Duration::from_millis(self.config.browser.content_wait_ms);
        let Some(ready) = driver
            .wait_for_selector(CONTENT_MARKER, wait)
            .await
            .map_err(navigation_error)?
        else {
            return Ok(Visit::NoPostsFound);
        };

        let settings = ScrollSettings {
            retry: self.retry,
            max_scroll_attempts: self.config.limits.max_scroll_attempts,
            no_new_content_max_attempts: self.config.extraction.no_new_content_max_attempts,
            target_posts: self.config.limits.max_posts_per_account,
        };
        let harvest = harvest_feed(driver, &self.extractor, username, &settings, ready)
            .await
            .map_err(navigation_error)?;

        tracing::debug!(
            account = %username,
            scrolls = harvest.scroll_attempts,
            stop = ?harvest.stop_reason,
            "Timeline harvested"
        );
        Ok(Visit::Posts(harvest.posts))
    }

    /// Persists posts and announces the ones not yet delivered
    ///
    /// Returns how many posts were delivered for the first time.
    fn deliver_posts(
        &self,
        username: &str,
        posts: &[Post],
        persistence_failures: &mut u32,
    ) -> Result<usize> {
        let mut delivered = 0;

        for post in posts {
            let stored = storage::lock(&self.storage).and_then(|mut store| store.upsert_post(self.owner(), post));
            if let Err(e) = stored {
                self.persistence_failed(username, e, persistence_failures)?;
                continue;
            }

            let id = post.id.as_str();
            match self.dedup.has(self.owner(), id) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    self.persistence_failed(username, e, persistence_failures)?;
                    continue;
                }
            }

            self.events.emit(HarvestEvent::post_ready(post));

            match self.dedup.record(self.owner(), id) {
                Ok(()) => delivered += 1,
                Err(e) => self.persistence_failed(username, e, persistence_failures)?,
            }
        }

        Ok(delivered)
    }

    /// Counts a persistence failure, escalating once the cycle budget is spent
    fn persistence_failed(&self, username: &str, err: StorageError, failures: &mut u32) -> Result<()> {
        *failures += 1;
        tracing::error!(
            account = %username,
            "Persistence failure {}/{}: {}",
            failures,
            self.config.limits.max_persistence_failures,
            err
        );

        if *failures >= self.config.limits.max_persistence_failures {
            return Err(HarvestError::Persistence(err));
        }
        Ok(())
    }

    fn fail_cycle(&self, cycle: &str, err: &HarvestError) {
        if matches!(err, HarvestError::Authentication(_)) {
            self.events.emit(HarvestEvent::AuthRequired {});
        }
        tracing::error!("Aborting {} cycle: {}", cycle, err);
    }
}

/// Maps a driver failure during navigation onto the crawl taxonomy
fn navigation_error(err: DriverError) -> HarvestError {
    match err {
        DriverError::Timeout { url } => HarvestError::NavigationTimeout { url },
        other => HarvestError::Driver(other),
    }
}

/// Rejects login walls and terminal account pages
fn check_landing(landing: &PageSnapshot, username: &str) -> Result<()> {
    if SessionManager::detect_invalidated(landing) {
        return Err(HarvestError::Authentication(format!(
            "login wall while opening @{}",
            username
        )));
    }

    if let Some(kind) = classify_inaccessible(landing) {
        return Err(HarvestError::InaccessibleAccount {
            username: username.to_string(),
            kind,
        });
    }

    Ok(())
}

/// Classifies a page that shows a terminal marker instead of a timeline
///
/// Only page chrome is searched: a post quoting a marker phrase leaves the
/// account readable.
pub fn classify_inaccessible(snapshot: &PageSnapshot) -> Option<InaccessibleKind> {
    if snapshot.status == Some(404) {
        return Some(InaccessibleKind::NotFound);
    }

    let text = snapshot.body_text_outside(POST_SUBTREES);
    TERMINAL_MARKERS
        .iter()
        .find(|(marker, _)| text.contains(marker))
        .map(|(_, kind)| *kind)
}
