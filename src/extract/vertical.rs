//! Vertical keyword filtering
//!
//! A run targets one vertical (cleaning services, HVAC, ...). Listings are
//! kept or dropped on include/exclude keywords found in their text.

use super::ExtractedListing;
use crate::config::VerticalFilter;

impl VerticalFilter {
    /// Decides whether a listing belongs to this vertical
    ///
    /// Exclude keywords are checked first and reject outright; then the
    /// listing must mention at least one include keyword. An empty include
    /// list accepts anything not excluded. Matching is case-insensitive over
    /// title, snippet and business type, and a keyword must appear as a
    /// whole word or its plural: "maid" matches "maids" but not "mermaid".
    pub fn matches(&self, listing: &ExtractedListing) -> bool {
        let haystack = listing.search_text();

        if self
            .exclude
            .iter()
            .any(|keyword| mentions(&haystack, keyword))
        {
            return false;
        }

        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|keyword| mentions(&haystack, keyword))
    }

    /// Label used in logs and reports
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.slug
        } else {
            &self.name
        }
    }
}

/// True when `keyword` occurs in the lowercase `haystack` as a whole word,
/// optionally pluralised with a trailing `s`
fn mentions(haystack: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }

    let is_word_char = |c: char| c.is_alphanumeric();
    haystack.match_indices(&keyword).any(|(start, found)| {
        let before = haystack[..start].chars().next_back();
        let after = &haystack[start + found.len()..];
        let after = after.strip_prefix('s').unwrap_or(after);
        !before.is_some_and(is_word_char) && !after.chars().next().is_some_and(is_word_char)
    })
}
