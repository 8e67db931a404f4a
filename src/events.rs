//! Events emitted to downstream collaborators
//!
//! The harvester does not deliver posts itself: every new post, roster update
//! and failure is announced as a [`HarvestEvent`] through an [`EventSink`].

use crate::model::{InaccessibleKind, Post};
use serde::Serialize;
use tokio::sync::mpsc;

/// One event on the harvester's outbound bus
///
/// Serialized with a `type` tag carrying the event name, e.g.
/// `{"type":"followings-updated","count":12}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HarvestEvent {
    /// A discovery pass finished
    FollowingsUpdated { count: usize },

    /// A content cycle finished
    #[serde(rename_all = "camelCase")]
    ContentUpdated { processed_account_count: usize },

    /// A post was seen for the first time and is ready for downstream processing
    #[serde(rename_all = "camelCase")]
    PostReadyForProcessing {
        text: String,
        author_username: String,
        url: Option<String>,
    },

    /// The stored session is missing or was rejected
    AuthRequired {},

    /// A single account could not be crawled
    #[serde(rename_all = "camelCase")]
    CrawlError {
        account: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        inaccessible: Option<InaccessibleKind>,
    },
}

impl HarvestEvent {
    pub fn post_ready(post: &Post) -> Self {
        Self::PostReadyForProcessing {
            text: post.text.clone(),
            author_username: post.author.username.clone(),
            url: post.url.clone(),
        }
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::FollowingsUpdated { .. } => "followings-updated",
            Self::ContentUpdated { .. } => "content-updated",
            Self::PostReadyForProcessing { .. } => "post-ready-for-processing",
            Self::AuthRequired {} => "auth-required",
            Self::CrawlError { .. } => "crawl-error",
        }
    }
}

/// Receiver of harvester events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

/// Renders every event as a log record
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: HarvestEvent) {
        match &event {
            HarvestEvent::AuthRequired {} => {
                tracing::error!(event = event.name(), "Session rejected; re-import cookies")
            }
            HarvestEvent::CrawlError { account, reason, .. } => {
                tracing::warn!(event = event.name(), account = %account, "{}", reason)
            }
            HarvestEvent::PostReadyForProcessing { author_username, url, .. } => tracing::info!(
                event = event.name(),
                author = %author_username,
                url = url.as_deref().unwrap_or("-"),
                "New post"
            ),
            _ => match serde_json::to_string(&event) {
                Ok(json) => tracing::info!(event = event.name(), "{}", json),
                Err(e) => tracing::warn!(event = event.name(), "Unserializable event: {}", e),
            },
        }
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<HarvestEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HarvestEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: HarvestEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}
