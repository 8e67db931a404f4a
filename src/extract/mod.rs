//! Content extraction from rendered timelines
//!
//! This module turns a rendered account timeline into structured posts:
//! - an ordered chain of [`ExtractionStrategy`] values locates post items
//! - a cascade of text heuristics and metric parsing fills each item
//! - results are merged by post id, earlier strategies winning, and kept in
//!   page order
//! - [`harvest_feed`] drives the reveal/extract loop over one timeline

mod metrics;
mod scroll;
mod strategy;
mod text;

pub use metrics::{extract_metrics, parse_metric, MetricKind};
pub use scroll::{harvest_feed, FeedHarvest, ScrollSettings, StopReason};
pub use strategy::{ExtractionStrategy, RawItem, StrategyError};
pub use text::{locate_text, TextSource};

use crate::config::ExtractionConfig;
use crate::model::{Author, Post, PostId};
use crate::HarvestError;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Selects every element under `root` matching `css`; a bad selector matches nothing
pub(crate) fn select_all<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => root.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Extracts posts from rendered timeline snapshots
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    strategies: Vec<ExtractionStrategy>,
    site_url: String,
    max_posts: usize,
    min_text_length: usize,
    allow_fallback_ids: bool,
}

impl ContentExtractor {
    /// Creates an extractor running the default strategy chain
    pub fn new(config: &ExtractionConfig, site_url: &str, max_posts: usize) -> Self {
        Self {
            strategies: ExtractionStrategy::CHAIN.to_vec(),
            site_url: site_url.trim_end_matches('/').to_string(),
            max_posts,
            min_text_length: config.min_text_length,
            allow_fallback_ids: config.allow_fallback_ids,
        }
    }

    /// Replaces the strategy chain
    pub fn with_strategies(mut self, strategies: Vec<ExtractionStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn max_posts(&self) -> usize {
        self.max_posts
    }

    /// Extracts up to `max_posts` posts from one snapshot of `account`'s timeline
    ///
    /// A failing strategy is logged and skipped; if nothing resolves, the
    /// result is empty rather than an error.
    pub fn extract(&self, html: &str, account: &str) -> Vec<Post> {
        let document = Html::parse_document(html);

        let results: Vec<Vec<RawItem>> = self
            .strategies
            .iter()
            .filter_map(|strategy| match strategy.run(&document, self.min_text_length) {
                Ok(items) => {
                    tracing::trace!(strategy = %strategy, items = items.len(), "Strategy finished");
                    Some(items)
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    None
                }
            })
            .collect();

        self.merge(results, account)
    }

    /// Merges per-strategy results by id; the first strategy to resolve an id wins
    ///
    /// Posts come back in page order, each at the earliest position any
    /// strategy found it, so the cap keeps the top of the timeline.
    fn merge(&self, results: Vec<Vec<RawItem>>, account: &str) -> Vec<Post> {
        let mut slots: HashMap<PostId, usize> = HashMap::new();
        let mut resolved_texts: HashSet<String> = HashSet::new();
        let mut posts: Vec<(usize, Post)> = Vec::new();
        let mut unresolved = Vec::new();

        for item in results.into_iter().flatten() {
            let Some(id) = item.id.clone() else {
                unresolved.push(item);
                continue;
            };

            let id = PostId::Real(id);
            match slots.get(&id) {
                Some(&slot) => posts[slot].0 = posts[slot].0.min(item.position),
                None => {
                    slots.insert(id.clone(), posts.len());
                    resolved_texts.insert(item.text.clone());
                    posts.push((item.position, self.build_post(id, item, account)));
                }
            }
        }

        let mut dropped = 0usize;
        for item in unresolved {
            if resolved_texts.contains(&item.text) {
                continue;
            }
            if !self.allow_fallback_ids || !item.looks_like_post {
                dropped += 1;
                continue;
            }

            let id = fallback_id(
                item.author_username.as_deref().unwrap_or(account),
                &item.text,
            );
            match slots.get(&id) {
                Some(&slot) => posts[slot].0 = posts[slot].0.min(item.position),
                None => {
                    slots.insert(id.clone(), posts.len());
                    posts.push((item.position, self.build_post(id, item, account)));
                }
            }
        }

        if dropped > 0 {
            let err = HarvestError::ExtractionAmbiguity(format!(
                "{} item(s) on @{} had no permalink and were dropped",
                dropped, account
            ));
            tracing::warn!(account, "{}", err);
        }

        posts.sort_by_key(|(position, _)| *position);
        posts
            .into_iter()
            .take(self.max_posts)
            .map(|(_, post)| post)
            .collect()
    }

    fn build_post(&self, id: PostId, item: RawItem, account: &str) -> Post {
        let username = item
            .author_username
            .unwrap_or_else(|| account.to_string());

        let url = match &id {
            PostId::Real(real) => Some(format!("{}/{}/status/{}", self.site_url, username, real)),
            PostId::Fallback(_) => None,
        };

        Post {
            id,
            url,
            timestamp: item.timestamp,
            text: item.text,
            author: Author {
                username,
                display_name: item.author_display_name,
            },
            metrics: item.metrics,
        }
    }
}

/// Content-derived identity: stable across cycles for identical author and text
pub fn fallback_id(author: &str, text: &str) -> PostId {
    let mut hasher = Sha256::new();
    hasher.update(author.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    PostId::fallback_from_digest(&hex::encode(hasher.finalize()))
}
