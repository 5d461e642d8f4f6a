//! Structural fingerprints of DOM elements
//!
//! Two elements built from the same template produce the same signature no
//! matter what text they carry, which is what lets the detector find listing
//! cards on pages it has never seen.

use super::dom;
use regex::Regex;
use scraper::ElementRef;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static CURRENCY_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[\d,]+").expect("hardcoded regex pattern is valid"));

/// Coarse size class of an element's visible text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextBucket {
    Short,
    Medium,
    Long,
}

impl TextBucket {
    /// Buckets a character count: short below 50, long above 200
    pub fn from_length(chars: usize) -> Self {
        match chars {
            0..=49 => Self::Short,
            50..=200 => Self::Medium,
            _ => Self::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

/// Returns true when the text contains a dollar amount such as `$12,345`
pub fn has_currency_amount(text: &str) -> bool {
    CURRENCY_AMOUNT.is_match(text)
}

/// Builds the structural signature of an element
///
/// The signature is a `|`-joined list of:
/// - the tag name
/// - `children:` followed by the sorted, de-duplicated direct child tags (omitted for leaves)
/// - `has_link` when an anchor with an `href` is reachable inside the element
/// - `has_img` when an image is inside the element
/// - `text:short`, `text:medium` or `text:long`
/// - `has_price` when the visible text carries a dollar amount
///
/// # Examples
///
/// ```
/// use broker_sieve::extract::element_signature;
/// use scraper::{Html, Selector};
///
/// let doc = Html::parse_fragment("<div class='card'><h3><a href='/x'>Laundromat</a></h3><p>$95,000</p></div>");
/// let card = doc.select(&Selector::parse("div.card").unwrap()).next().unwrap();
/// assert_eq!(element_signature(card), "div|children:h3,p|has_link|text:short|has_price");
/// ```
pub fn element_signature(element: ElementRef<'_>) -> String {
    let text = dom::visible_text(element);
    signature_with_text(element, &text)
}

/// Same as [`element_signature`] for callers that already hold the visible text
pub(crate) fn signature_with_text(element: ElementRef<'_>, text: &str) -> String {
    let mut parts: Vec<String> = vec![element.value().name().to_string()];

    let child_tags: BTreeSet<&str> = element
        .children()
        .filter_map(ElementRef::wrap)
        .map(|child| child.value().name())
        .collect();
    if !child_tags.is_empty() {
        parts.push(format!(
            "children:{}",
            child_tags.into_iter().collect::<Vec<_>>().join(",")
        ));
    }

    if dom::has_link(element) {
        parts.push("has_link".to_string());
    }
    if dom::has_image(element) {
        parts.push("has_img".to_string());
    }

    let bucket = TextBucket::from_length(text.chars().count());
    parts.push(format!("text:{}", bucket.as_str()));

    if has_currency_amount(text) {
        parts.push("has_price".to_string());
    }

    parts.join("|")
}
