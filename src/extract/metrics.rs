//! Engagement counter parsing
//!
//! Counters are rendered as abbreviated text ("1.2K", "3M", "1,234"). A
//! counter element that exists but shows no number means zero; a counter that
//! cannot be found or read stays `None`.

use crate::extract::select_all;
use crate::model::Metrics;
use regex::Regex;
use scraper::ElementRef;
use std::sync::LazyLock;

static RE_NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)*)\s*([KkMmBb])?").expect("valid numeral regex"));

/// Which counter of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Replies,
    Retweets,
    Likes,
    Views,
}

impl MetricKind {
    const ALL: [MetricKind; 4] = [Self::Replies, Self::Retweets, Self::Likes, Self::Views];

    /// Selectors of the counter element itself
    fn primary_selectors(&self) -> &'static str {
        match self {
            Self::Replies => r#"[data-testid="reply"]"#,
            Self::Retweets => r#"[data-testid="retweet"], [data-testid="unretweet"]"#,
            Self::Likes => r#"[data-testid="like"], [data-testid="unlike"]"#,
            Self::Views => r#"a[href$="/analytics"]"#,
        }
    }

    /// Word stem used in accessible labels ("12 replies", "3 reposts")
    fn label_pattern(&self) -> &'static Regex {
        static REPLIES: LazyLock<Regex> = LazyLock::new(|| label_regex("repl"));
        static RETWEETS: LazyLock<Regex> = LazyLock::new(|| label_regex("(?:repost|retweet)"));
        static LIKES: LazyLock<Regex> = LazyLock::new(|| label_regex("like"));
        static VIEWS: LazyLock<Regex> = LazyLock::new(|| label_regex("view"));

        match self {
            Self::Replies => &REPLIES,
            Self::Retweets => &RETWEETS,
            Self::Likes => &LIKES,
            Self::Views => &VIEWS,
        }
    }
}

fn label_regex(stem: &str) -> Regex {
    Regex::new(&format!(r"(?i)(\d+(?:[.,]\d+)*\s*[kmb]?)\s+{}", stem)).expect("valid label regex")
}

/// Parses an abbreviated counter
///
/// Returns `None` when the text holds no numeral.
///
/// ```
/// use follow_harvester::parse_metric;
///
/// assert_eq!(parse_metric("1.2K"), Some(1_200));
/// assert_eq!(parse_metric("3M"), Some(3_000_000));
/// assert_eq!(parse_metric("0"), Some(0));
/// assert_eq!(parse_metric("n/a"), None);
/// ```
pub fn parse_metric(text: &str) -> Option<u64> {
    let caps = RE_NUMERAL.captures(text)?;
    let numeral = caps.get(1)?.as_str();

    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(s) if s == "K" => 1e3,
        Some(s) if s == "M" => 1e6,
        Some(s) if s == "B" => 1e9,
        _ => {
            // Plain counts are integers; any separator groups thousands
            let digits: String = numeral.chars().filter(|c| c.is_ascii_digit()).collect();
            return digits.parse::<u64>().ok();
        }
    };

    // Abbreviated counts use a single decimal mark, either '.' or ','
    let decimal = if numeral.contains('.') {
        numeral.replace(',', "")
    } else {
        numeral.replace(',', ".")
    };

    let value = decimal.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

/// Reads all four counters of a post element
pub fn extract_metrics(item: ElementRef<'_>) -> Metrics {
    let mut values = MetricKind::ALL.iter().map(|kind| metric_value(item, *kind));
    Metrics {
        replies: values.next().flatten(),
        retweets: values.next().flatten(),
        likes: values.next().flatten(),
        views: values.next().flatten(),
    }
}

fn metric_value(item: ElementRef<'_>, kind: MetricKind) -> Option<u64> {
    if let Some(element) = select_all(item, kind.primary_selectors()).into_iter().next() {
        let text = element.text().collect::<String>();
        let text = text.trim();
        if text.is_empty() {
            return Some(0);
        }
        return parse_metric(text);
    }

    // Accessible labels are only a fallback for a missing counter element
    select_all(item, "[aria-label]")
        .into_iter()
        .filter_map(|el| el.value().attr("aria-label"))
        .find_map(|label| {
            kind.label_pattern()
                .captures(label)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_metric(m.as_str()))
        })
}
