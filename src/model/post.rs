use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Prefix of content-hash identities
const FALLBACK_PREFIX: &str = "fallback-";

/// Identity of an extracted post
///
/// `Real` ids come from a permalink on the page. `Fallback` ids are derived
/// from the post content when no permalink could be resolved and carry a
/// lower confidence: the same physical post may later be seen under its real id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PostId {
    Real(String),
    Fallback(String),
}

impl PostId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Real(id) | Self::Fallback(id) => id,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Rebuilds an id from its stored form
    pub fn from_stored(id: &str, is_fallback: bool) -> Self {
        if is_fallback {
            Self::Fallback(id.to_string())
        } else {
            Self::Real(id.to_string())
        }
    }

    /// Builds a fallback id from a content digest
    pub fn fallback_from_digest(hex_digest: &str) -> Self {
        let short = &hex_digest[..hex_digest.len().min(16)];
        Self::Fallback(format!("{}{}", FALLBACK_PREFIX, short))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a post as rendered on the timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub username: String,
    pub display_name: Option<String>,
}

/// Engagement counters; `None` means the counter could not be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub replies: Option<u64>,
    pub retweets: Option<u64>,
    pub likes: Option<u64>,
    pub views: Option<u64>,
}

/// A post extracted from an account timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub text: String,
    pub author: Author,
    pub metrics: Metrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_ids_are_distinguishable() {
        let real = PostId::Real("1790000000000000000".to_string());
        let fallback = PostId::fallback_from_digest(
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
        );

        assert!(!real.is_fallback());
        assert!(fallback.is_fallback());
        assert_eq!(fallback.as_str(), "fallback-9f86d081884c7d65");
        assert_eq!(PostId::from_stored(fallback.as_str(), true), fallback);
    }
}
