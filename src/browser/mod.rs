//! Rendered-page navigation
//!
//! The harvester never talks to the social site directly. A [`PageDriver`]
//! owns one browser-equivalent session and yields rendered snapshots of
//! whatever page it currently has open:
//! - [`BrowserlessDriver`] renders pages through a Browserless `/content` service
//! - tests substitute scripted drivers that replay canned markup

mod browserless;

pub use browserless::BrowserlessDriver;

use crate::model::Credential;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a page driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Timed out loading {url}")]
    Timeout { url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Render service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("No page has been opened yet")]
    NoPage,
}

impl DriverError {
    /// Returns true for failures a later attempt may not repeat
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::NoPage => false,
        }
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            DriverError::Timeout { url }
        } else {
            DriverError::Network(err.to_string())
        }
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// A rendered snapshot of the page currently open in the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status of the main document, when the renderer reports it
    pub status: Option<u16>,

    /// Serialized DOM after rendering
    pub html: String,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            html: html.into(),
        }
    }

    /// Returns true if any element matches the CSS selector
    pub fn has_element(&self, css: &str) -> bool {
        html_has_element(&self.html, css)
    }

    /// Visible body text, leaving out every subtree that matches `excluded`
    pub fn body_text_outside(&self, excluded: &str) -> String {
        let (Ok(body_selector), Ok(excluded)) = (Selector::parse("body"), Selector::parse(excluded))
        else {
            return String::new();
        };

        let document = Html::parse_document(&self.html);
        let mut parts: Vec<&str> = Vec::new();
        for body in document.select(&body_selector) {
            for node in body.descendants() {
                let Some(text) = node.value().as_text() else {
                    continue;
                };
                let inside_excluded = node
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|element| excluded.matches(&element));
                if !inside_excluded {
                    parts.push(text);
                }
            }
        }
        parts.join(" ")
    }
}

/// Returns true if any element of `html` matches `css`
pub fn html_has_element(html: &str, css: &str) -> bool {
    let Ok(selector) = Selector::parse(css) else {
        return false;
    };
    Html::parse_document(html).select(&selector).next().is_some()
}

/// One browser-equivalent session
///
/// All methods take `&mut self`: a driver holds a single page and callers
/// must serialize navigation through it.
#[async_trait]
pub trait PageDriver: Send {
    /// Installs session cookies for every following navigation
    async fn apply_credentials(&mut self, credentials: &[Credential]) -> DriverResult<()>;

    /// Opens `url` and returns the first rendered snapshot
    async fn navigate(&mut self, url: &str) -> DriverResult<PageSnapshot>;

    /// Waits up to `timeout` for `selector` to render on the open page
    ///
    /// Returns `Ok(None)` when the selector never appeared.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<Option<PageSnapshot>>;

    /// Extends the revealed part of the page (one scroll step)
    async fn reveal_more(&mut self) -> DriverResult<()>;

    /// Renders the open page at its current reveal depth
    async fn snapshot(&mut self) -> DriverResult<PageSnapshot>;

    /// Cookies the session currently holds, including rotated ones
    fn credentials(&self) -> Vec<Credential>;
}
