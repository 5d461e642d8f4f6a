//! Repeating-structure detection
//!
//! Listing pages render every business as the same card template. The
//! detector groups container-like elements by [signature](super::element_signature)
//! and keeps the groups that look like cards: enough members, and enough of
//! them linking somewhere with a paragraph of text.

use super::dom;
use super::signature::signature_with_text;
use crate::config::DetectorConfig;
use scraper::{ElementRef, Html};
use std::collections::HashMap;

/// Tags that commonly wrap a single listing card
const CONTAINER_TAGS: &[&str] = &["div", "article", "section", "li", "tr"];

/// A group of elements sharing one signature
#[derive(Debug, Clone)]
pub struct Pattern<'a> {
    pub signature: String,
    pub elements: Vec<ElementRef<'a>>,
    pub avg_text_length: f64,
}

impl<'a> Pattern<'a> {
    pub fn count(&self) -> usize {
        self.elements.len()
    }
}

/// Outcome of running the detector over a page
#[derive(Debug)]
pub enum Detection<'a> {
    /// Surviving groups, largest first
    Found(Vec<Pattern<'a>>),
    /// Nothing on the page looks like a listing card
    NoPattern,
}

impl<'a> Detection<'a> {
    pub fn patterns(&self) -> &[Pattern<'a>] {
        match self {
            Self::Found(patterns) => patterns,
            Self::NoPattern => &[],
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Signatures of every surviving group, in rank order
    pub fn signatures(&self) -> Vec<String> {
        self.patterns().iter().map(|p| p.signature.clone()).collect()
    }
}

/// A candidate element with its precomputed signature and text length
struct Candidate<'a> {
    element: ElementRef<'a>,
    signature: String,
    text_length: usize,
    has_link: bool,
}

/// Walks the page and fingerprints every container within the depth band
fn candidates<'a>(document: &'a Html, config: &DetectorConfig) -> Vec<Candidate<'a>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| CONTAINER_TAGS.contains(&el.value().name()))
        .filter(|el| {
            let depth = dom::depth(*el);
            depth >= config.min_depth && depth <= config.max_depth
        })
        .map(|element| {
            let text = dom::visible_text(element);
            Candidate {
                element,
                signature: signature_with_text(element, &text),
                text_length: text.chars().count(),
                has_link: dom::has_link(element),
            }
        })
        .collect()
}

/// Groups candidates by signature, keeping first-seen order
fn group<'a>(candidates: Vec<Candidate<'a>>) -> Vec<(String, Vec<Candidate<'a>>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Candidate<'a>>)> = Vec::new();

    for candidate in candidates {
        match index.get(&candidate.signature) {
            Some(&i) => groups[i].1.push(candidate),
            None => {
                index.insert(candidate.signature.clone(), groups.len());
                groups.push((candidate.signature.clone(), vec![candidate]));
            }
        }
    }

    groups
}

fn into_pattern<'a>(signature: String, members: Vec<Candidate<'a>>) -> Pattern<'a> {
    let total: usize = members.iter().map(|c| c.text_length).sum();
    let avg_text_length = if members.is_empty() {
        0.0
    } else {
        total as f64 / members.len() as f64
    };

    Pattern {
        signature,
        elements: members.into_iter().map(|c| c.element).collect(),
        avg_text_length,
    }
}

/// Finds listing-card patterns on a page
///
/// A group survives when it has at least `min_group_size` members and at
/// least `min_valid_members` of them carry a link and more than
/// `min_card_text` characters of text. Survivors are ranked by member count,
/// largest first; equal counts keep document order.
///
/// # Arguments
///
/// * `document` - Parsed page
/// * `config` - Depth band and group thresholds
///
/// # Returns
///
/// [`Detection::Found`] with at least one pattern, or [`Detection::NoPattern`]
pub fn find_patterns<'a>(document: &'a Html, config: &DetectorConfig) -> Detection<'a> {
    let mut patterns: Vec<Pattern<'a>> = group(candidates(document, config))
        .into_iter()
        .filter(|(_, members)| members.len() >= config.min_group_size)
        .filter(|(_, members)| {
            members
                .iter()
                .filter(|c| c.has_link && c.text_length > config.min_card_text)
                .count()
                >= config.min_valid_members
        })
        .map(|(signature, members)| into_pattern(signature, members))
        .collect();

    if patterns.is_empty() {
        tracing::debug!("No repeating listing structure found");
        return Detection::NoPattern;
    }

    // Stable sort keeps document order between equal counts
    patterns.sort_by(|a, b| b.count().cmp(&a.count()));

    tracing::debug!(
        "Detected {} pattern(s); top signature '{}' with {} members",
        patterns.len(),
        patterns[0].signature,
        patterns[0].count()
    );

    Detection::Found(patterns)
}

/// Collects the elements matching a known signature
///
/// Used to reuse a cached or previously winning pattern without running the
/// full validity check. Returns `None` when no element on the page matches.
pub fn select_by_signature<'a>(
    document: &'a Html,
    signature: &str,
    config: &DetectorConfig,
) -> Option<Pattern<'a>> {
    let members: Vec<Candidate<'a>> = candidates(document, config)
        .into_iter()
        .filter(|c| c.signature == signature)
        .collect();

    if members.is_empty() {
        None
    } else {
        Some(into_pattern(signature.to_string(), members))
    }
}
