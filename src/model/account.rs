//! Accounts on the tracked roster and their crawl classification
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Error text stored on accounts that are protected, suspended or gone
pub const ACCOUNT_NOT_ACCESSIBLE: &str = "Account not accessible";

/// A followed account monitored for new posts
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Handle on the target site, unique per tracked identity
    pub username: String,

    pub display_name: Option<String>,

    pub profile_url: Option<String>,

    /// Time of the last crawl attempt, successful or not
    pub last_update: Option<DateTime<Utc>>,

    /// Classification of the last failed attempt
    pub last_error: Option<String>,

    pub posts_collected: u64,
}

impl Account {
    /// Builds a freshly discovered account with no crawl history
    pub fn discovered(
        username: impl Into<String>,
        display_name: Option<String>,
        profile_url: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            display_name,
            profile_url,
            last_update: None,
            last_error: None,
            posts_collected: 0,
        }
    }

    /// Hours elapsed since the last crawl attempt, or None if never attempted
    pub fn hours_since_update(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_update
            .map(|last| (now - last).num_milliseconds() as f64 / 3_600_000.0)
    }
}

/// Terminal reasons an account timeline cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InaccessibleKind {
    /// Posts are visible only to approved followers
    Protected,

    /// The account was suspended by the site
    Suspended,

    /// The handle does not exist (deleted or renamed)
    NotFound,
}

impl InaccessibleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protected => "protected",
            Self::Suspended => "suspended",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for InaccessibleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
