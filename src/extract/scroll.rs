//! Reveal/extract loop over one account timeline

use super::ContentExtractor;
use crate::browser::{DriverResult, PageDriver, PageSnapshot};
use crate::crawler::RetryPolicy;
use crate::model::{Post, PostId};
use std::collections::HashSet;

/// Bounds of one timeline harvest
#[derive(Debug, Clone, Copy)]
pub struct ScrollSettings {
    pub retry: RetryPolicy,
    pub max_scroll_attempts: u32,
    /// Consecutive reveals with no new post before the page counts as stalled
    pub no_new_content_max_attempts: u32,
    pub target_posts: usize,
}

/// Why a harvest stopped revealing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    AttemptsExhausted,
    Stalled,
    /// A reveal failed after retries; posts gathered so far are kept
    RevealFailed,
}

/// Posts gathered from one timeline, in first-seen order
#[derive(Debug, Clone)]
pub struct FeedHarvest {
    pub posts: Vec<Post>,
    pub scroll_attempts: u32,
    pub stop_reason: StopReason,
}

/// Extracts `initial`, then reveals more of the page until a bound is hit
///
/// Stops on the first of: `target_posts` collected, `max_scroll_attempts`
/// reveals made, or `no_new_content_max_attempts` consecutive reveals that
/// added no new post.
pub async fn harvest_feed(
    driver: &mut dyn PageDriver,
    extractor: &ContentExtractor,
    account: &str,
    settings: &ScrollSettings,
    initial: PageSnapshot,
) -> DriverResult<FeedHarvest> {
    let mut seen: HashSet<PostId> = HashSet::new();
    let mut posts = Vec::new();

    merge_new(&mut seen, &mut posts, extractor.extract(&initial.html, account));

    let mut scroll_attempts = 0;
    let mut no_change = 0;

    let stop_reason = loop {
        if posts.len() >= settings.target_posts {
            break StopReason::TargetReached;
        }
        if scroll_attempts >= settings.max_scroll_attempts {
            break StopReason::AttemptsExhausted;
        }
        if no_change >= settings.no_new_content_max_attempts {
            break StopReason::Stalled;
        }

        scroll_attempts += 1;
        let snapshot = match settings.retry.reveal_more(driver).await {
            Ok(snapshot) => snapshot,
            Err(e) if posts.is_empty() => return Err(e),
            Err(e) => {
                tracing::warn!(account, "Reveal failed after {} posts: {}", posts.len(), e);
                break StopReason::RevealFailed;
            }
        };

        let added = merge_new(&mut seen, &mut posts, extractor.extract(&snapshot.html, account));
        if added == 0 {
            no_change += 1;
        } else {
            no_change = 0;
        }

        tracing::debug!(
            account,
            attempt = scroll_attempts,
            added,
            total = posts.len(),
            "Scroll attempt finished"
        );
    };

    posts.truncate(settings.target_posts);

    Ok(FeedHarvest {
        posts,
        scroll_attempts,
        stop_reason,
    })
}

fn merge_new(seen: &mut HashSet<PostId>, posts: &mut Vec<Post>, batch: Vec<Post>) -> usize {
    let before = posts.len();
    posts.extend(batch.into_iter().filter(|post| seen.insert(post.id.clone())));
    posts.len() - before
}
