//! Extraction strategies
//!
//! Each strategy anchors on a different kind of element to find post items in
//! a rendered timeline and resolves the same fields for every item. They are
//! run in order and merged by post id.

use crate::extract::metrics::extract_metrics;
use crate::extract::select_all;
use crate::extract::text::{element_text, locate_text, TextSource};
use crate::model::Metrics;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static RE_PERMALINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)([A-Za-z0-9_]{1,15})/status/(\d+)").expect("valid permalink regex")
});

static RE_PROFILE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_]{1,15})/?$").expect("valid profile regex"));

/// A strategy failed to run at all
#[derive(Debug, Error)]
#[error("strategy {strategy} failed: {message}")]
pub struct StrategyError {
    pub strategy: ExtractionStrategy,
    pub message: String,
}

/// Ways of locating post items in a rendered timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionStrategy {
    /// Post containers marked as posts
    ContainerAnchored,

    /// Timeline cells carrying the list-item test marker
    ItemMarkerAnchored,

    /// Any article-like block
    GenericBlockAnchored,

    /// Text nodes, widened to the nearest ancestor holding a permalink
    TextNodeFallback,
}

impl ExtractionStrategy {
    /// The default chain, most specific first
    pub const CHAIN: [ExtractionStrategy; 4] = [
        Self::ContainerAnchored,
        Self::ItemMarkerAnchored,
        Self::GenericBlockAnchored,
        Self::TextNodeFallback,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ContainerAnchored => "container-anchored",
            Self::ItemMarkerAnchored => "item-marker-anchored",
            Self::GenericBlockAnchored => "generic-block-anchored",
            Self::TextNodeFallback => "text-node-fallback",
        }
    }

    /// Resolves every item this strategy can anchor on
    pub fn run(&self, document: &Html, min_text_length: usize) -> Result<Vec<RawItem>, StrategyError> {
        let root = document.root_element();
        let anchors = match self {
            Self::ContainerAnchored => self.select(root, r#"article[data-testid="tweet"]"#)?,
            Self::ItemMarkerAnchored => self.select(root, r#"[data-testid="cellInnerDiv"]"#)?,
            Self::GenericBlockAnchored => self.select(root, r#"article, [role="article"]"#)?,
            Self::TextNodeFallback => self.text_anchors(root)?,
        };

        let order: HashMap<_, usize> = root
            .descendants()
            .enumerate()
            .map(|(position, node)| (node.id(), position))
            .collect();

        Ok(anchors
            .into_iter()
            .filter_map(|item| {
                let position = order.get(&item.id()).copied().unwrap_or(usize::MAX);
                resolve_item(item, min_text_length, position)
            })
            .collect())
    }

    fn select<'a>(&self, root: ElementRef<'a>, css: &str) -> Result<Vec<ElementRef<'a>>, StrategyError> {
        let selector = scraper::Selector::parse(css).map_err(|e| StrategyError {
            strategy: *self,
            message: format!("bad selector {}: {:?}", css, e),
        })?;
        Ok(outermost(root.select(&selector).collect()))
    }

    fn text_anchors<'a>(&self, root: ElementRef<'a>) -> Result<Vec<ElementRef<'a>>, StrategyError> {
        let mut seen = HashSet::new();
        let mut anchors = Vec::new();

        for text_node in self.select(root, r#"[data-testid="tweetText"], div[lang]"#)? {
            let container = text_node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|ancestor| !select_all(*ancestor, r#"a[href*="/status/"]"#).is_empty())
                .or_else(|| text_node.parent().and_then(ElementRef::wrap))
                .unwrap_or(text_node);

            if seen.insert(container.id()) {
                anchors.push(container);
            }
        }

        Ok(anchors)
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drops anchors nested inside another anchor (quoted posts inside posts)
fn outermost(anchors: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let ids: HashSet<_> = anchors.iter().map(|a| a.id()).collect();
    anchors
        .into_iter()
        .filter(|a| !a.ancestors().any(|parent| ids.contains(&parent.id())))
        .collect()
}

/// Fields one strategy resolved for one physical item
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    /// Post id from the permalink, if one was found
    pub id: Option<String>,
    pub author_username: Option<String>,
    pub author_display_name: Option<String>,
    pub text: String,
    pub text_source: TextSource,
    pub timestamp: Option<DateTime<Utc>>,
    pub metrics: Metrics,
    /// The item carries post chrome (text marker, author block or time)
    pub looks_like_post: bool,
    /// Document order of the anchor element
    pub position: usize,
}

fn resolve_item(item: ElementRef<'_>, min_text_length: usize, position: usize) -> Option<RawItem> {
    let (text, text_source) = locate_text(item, min_text_length)?;
    let permalink = resolve_permalink(item);

    let author_username = permalink
        .as_ref()
        .map(|(user, _)| user.clone())
        .or_else(|| resolve_profile_username(item));

    let looks_like_post = !select_all(
        item,
        r#"[data-testid="tweetText"], [data-testid="User-Name"], time"#,
    )
    .is_empty();

    Some(RawItem {
        id: permalink.map(|(_, id)| id),
        author_username,
        author_display_name: resolve_display_name(item),
        text,
        text_source,
        timestamp: resolve_timestamp(item),
        metrics: extract_metrics(item),
        looks_like_post,
        position,
    })
}

/// Finds `(username, post id)` from the item's own permalink
///
/// The permalink wrapping the timestamp is preferred, since quoted posts
/// carry permalinks of their own.
fn resolve_permalink(item: ElementRef<'_>) -> Option<(String, String)> {
    let links = select_all(item, r#"a[href*="/status/"]"#);
    let preferred = links
        .iter()
        .find(|a| !select_all(**a, "time").is_empty())
        .or_else(|| links.first())?;

    let href = preferred.value().attr("href")?;
    let caps = RE_PERMALINK.captures(href)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn resolve_profile_username(item: ElementRef<'_>) -> Option<String> {
    select_all(item, r#"[data-testid="User-Name"] a[href]"#)
        .into_iter()
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| RE_PROFILE_LINK.captures(href).map(|c| c[1].to_string()))
}

fn resolve_display_name(item: ElementRef<'_>) -> Option<String> {
    select_all(item, r#"[data-testid="User-Name"] span"#)
        .into_iter()
        .map(element_text)
        .find(|name| !name.is_empty() && !name.starts_with('@'))
}

fn resolve_timestamp(item: ElementRef<'_>) -> Option<DateTime<Utc>> {
    select_all(item, "time[datetime]")
        .into_iter()
        .filter_map(|t| t.value().attr("datetime"))
        .find_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
