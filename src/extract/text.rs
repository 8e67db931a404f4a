//! Post text location
//!
//! Text is located by a cascade of heuristics, most specific first:
//! the post text node, paragraph fragments, any language-tagged node above a
//! length threshold, and finally a walk over every text node of the item.

use crate::extract::select_all;
use scraper::{ElementRef, Node};

/// Elements whose text never belongs to the post body
const CHROME_SELECTORS: &str = r#"[role="group"], time, [data-testid="User-Name"], button"#;

/// Which heuristic produced a post's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Primary,
    Paragraphs,
    Threshold,
    SubtreeWalk,
}

/// Locates the text of a post element
pub fn locate_text(item: ElementRef<'_>, min_length: usize) -> Option<(String, TextSource)> {
    if let Some(text) = select_all(item, r#"[data-testid="tweetText"]"#)
        .into_iter()
        .map(element_text)
        .find(|t| !t.is_empty())
    {
        return Some((text, TextSource::Primary));
    }

    let paragraphs: Vec<String> = select_all(item, "p")
        .into_iter()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if !paragraphs.is_empty() {
        return Some((paragraphs.join("\n"), TextSource::Paragraphs));
    }

    if let Some(text) = select_all(item, r#"[lang], [dir="auto"], span"#)
        .into_iter()
        .map(element_text)
        .find(|t| t.chars().count() >= min_length)
    {
        return Some((text, TextSource::Threshold));
    }

    let walked = subtree_text(item);
    if walked.is_empty() {
        None
    } else {
        Some((walked, TextSource::SubtreeWalk))
    }
}

/// Text of an element with whitespace normalized per line
pub fn element_text(element: ElementRef<'_>) -> String {
    normalize(&element.text().collect::<String>())
}

/// Joins every text node under `item` except those inside post chrome
fn subtree_text(item: ElementRef<'_>) -> String {
    let chrome: Vec<_> = select_all(item, CHROME_SELECTORS)
        .into_iter()
        .map(|el| el.id())
        .collect();

    let pieces: Vec<&str> = item
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let inside_chrome = node.ancestors().any(|a| chrome.contains(&a.id()));
                (!inside_chrome).then(|| text.trim())
            }
            _ => None,
        })
        .filter(|t| !t.is_empty())
        .collect();

    normalize(&pieces.join(" "))
}

/// Collapses runs of spaces inside lines and drops blank lines
pub fn normalize(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
