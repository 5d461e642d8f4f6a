//! Hostname similarity
//!
//! Brokers built on the same listing platform tend to share hostname
//! fragments (`sunbeltnetwork`, `bizbuysell`, `transworld`), so character
//! trigram overlap between hostnames is a cheap proxy for "probably the same
//! page template".

use std::collections::HashSet;

/// Set of all three-character windows of `s`
///
/// Strings shorter than three characters have no trigrams.
pub fn trigrams(s: &str) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .windows(3)
        .map(|window| window.iter().collect())
        .collect()
}

/// Jaccard similarity of the trigram sets of two hostnames
///
/// Returns a value in `[0, 1]`; `0` when either side has no trigrams.
///
/// # Examples
///
/// ```
/// use broker_sieve::knowledge::domain_similarity;
///
/// assert_eq!(domain_similarity("acme.com", "acme.com"), 1.0);
/// assert_eq!(domain_similarity("ab", "ab"), 0.0);
/// ```
pub fn domain_similarity(a: &str, b: &str) -> f64 {
    let left = trigrams(a);
    let right = trigrams(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f64 / union as f64
}
