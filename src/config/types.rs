use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Follow-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    pub limits: LimitsConfig,
    pub intervals: IntervalsConfig,
    pub browser: BrowserConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub output: OutputConfig,
}

/// The tracked identity whose following list is harvested
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub username: String,
}

/// Per-cycle and per-account limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum posts kept from a single account visit
    #[serde(rename = "max-posts-per-account")]
    pub max_posts_per_account: usize,

    /// Maximum accounts visited in one content cycle
    #[serde(rename = "max-accounts-per-cycle")]
    pub max_accounts_per_cycle: usize,

    /// Maximum reveal (scroll) attempts on a single timeline
    #[serde(rename = "max-scroll-attempts")]
    pub max_scroll_attempts: u32,

    /// Maximum accounts collected by one discovery pass
    #[serde(rename = "max-accounts")]
    pub max_accounts: usize,

    /// Minimum staleness before an account is due again (hours)
    #[serde(rename = "min-hours-between-updates")]
    pub min_hours_between_updates: f64,

    /// Persistence failures tolerated within one cycle before it is aborted
    #[serde(
        rename = "max-persistence-failures",
        default = "default_max_persistence_failures"
    )]
    pub max_persistence_failures: u32,
}

/// Cadences of the two crawl loops
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalsConfig {
    #[serde(rename = "following-update-ms")]
    pub following_update_ms: u64,

    #[serde(rename = "content-fetch-ms")]
    pub content_fetch_ms: u64,
}

impl IntervalsConfig {
    pub fn following_update(&self) -> Duration {
        Duration::from_millis(self.following_update_ms)
    }

    pub fn content_fetch(&self) -> Duration {
        Duration::from_millis(self.content_fetch_ms)
    }
}

/// Render service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Base URL of the Browserless-compatible render service
    pub endpoint: String,

    /// Optional API token for the render service
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(rename = "slow-mo-ms", default)]
    pub slow_mo_ms: Option<u64>,

    /// Origin of the social site being crawled
    #[serde(rename = "site-url", default = "default_site_url")]
    pub site_url: String,

    #[serde(rename = "navigation-timeout-ms", default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Bounded wait for the first content marker on a timeline
    #[serde(rename = "content-wait-ms", default = "default_content_wait_ms")]
    pub content_wait_ms: u64,

    /// Pause after each reveal so the page can render new items
    #[serde(rename = "settle-ms", default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Content extraction tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Consecutive reveals without a new post before the scroll loop stops
    #[serde(rename = "no-new-content-max-attempts")]
    pub no_new_content_max_attempts: u32,

    /// Emit content-hash identities for posts without a permalink
    #[serde(rename = "allow-fallback-ids")]
    pub allow_fallback_ids: bool,

    /// Shortest text accepted by the generic text heuristic
    #[serde(rename = "min-text-length")]
    pub min_text_length: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            no_new_content_max_attempts: 3,
            allow_fallback_ids: false,
            min_text_length: 20,
        }
    }
}

/// Following-list discovery tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    #[serde(rename = "max-no-change-attempts")]
    pub max_no_change_attempts: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_no_change_attempts: 3,
        }
    }
}

/// Delay growth between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Bounded retry for navigation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,

    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
            backoff: Backoff::Exponential,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_true() -> bool {
    true
}

fn default_site_url() -> String {
    "https://x.com".to_string()
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_content_wait_ms() -> u64 {
    15_000
}

fn default_settle_ms() -> u64 {
    1_500
}

fn default_max_persistence_failures() -> u32 {
    3
}
