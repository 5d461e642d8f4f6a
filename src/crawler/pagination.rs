//! Next-page discovery
//!
//! Broker sites paginate in a handful of ways: a `rel="next"` or `.next`
//! anchor, a "Next" / "»" link, the last link of a `.pagination` block, or a
//! bare `page=N` / `/page/N` URL with no link at all. Heuristics run from
//! most to least explicit and the first that yields a usable URL wins.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// Selectors tried in order for an explicit next-page anchor
const NEXT_SELECTORS: &[&str] = &["a.next", "a.next-page", ".pagination .next"];

/// Link texts that mean "next page"
const NEXT_TEXTS: &[&str] = &[">", "»", "›", ">>"];

static PAGE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/page/(\d+)").expect("hardcoded regex pattern is valid"));

/// Finds the URL of the page after `current`
///
/// # Arguments
///
/// * `document` - The current page
/// * `current` - Final URL of the current page, used to resolve relative links
///
/// # Returns
///
/// The next page's URL, or `None` when pagination has ended
pub fn next_page_url(document: &Html, current: &Url) -> Option<Url> {
    find_next_link(document, current).or_else(|| increment_page_number(current))
}

fn find_next_link(document: &Html, current: &Url) -> Option<Url> {
    for css in std::iter::once(r#"a[rel="next"]"#).chain(NEXT_SELECTORS.iter().copied()) {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(url) = document
            .select(&selector)
            .find_map(|el| anchor_target(el, current))
        {
            return Some(url);
        }
    }

    // Listing cards link with free text, so only a whole-word "next" counts
    let anchors = Selector::parse("a[href]").ok()?;
    for element in document.select(&anchors) {
        let text = element.text().collect::<String>();
        if is_next_text(&text) {
            if let Some(url) = anchor_target(element, current) {
                return Some(url);
            }
        }
    }

    let last = Selector::parse(".pagination a:last-child").ok()?;
    document
        .select(&last)
        .find_map(|el| anchor_target(el, current))
}

/// True for "Next", "Next page", "Next »" and bare arrow link texts
fn is_next_text(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    if NEXT_TEXTS.contains(&lowered.as_str()) {
        return true;
    }

    let Some(rest) = lowered.strip_prefix("next") else {
        return false;
    };
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("page").unwrap_or(rest);
    rest.chars().all(|c| !c.is_alphanumeric())
}

/// Resolves the href of an anchor, or of the first anchor inside a wrapper
fn anchor_target(element: ElementRef<'_>, current: &Url) -> Option<Url> {
    let href = if element.value().name() == "a" {
        element.value().attr("href")
    } else {
        let anchor = Selector::parse("a[href]").ok()?;
        element
            .select(&anchor)
            .next()
            .and_then(|a| a.value().attr("href"))
    }?;

    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    let url = current.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    // A link back to the current page is not a next page
    let mut without_fragment = url.clone();
    without_fragment.set_fragment(None);
    let mut current_base = current.clone();
    current_base.set_fragment(None);
    if without_fragment == current_base {
        return None;
    }

    Some(url)
}

/// Bumps a `page=N` query parameter, else a `/page/N` path segment
fn increment_page_number(current: &Url) -> Option<Url> {
    let has_page_param = current.query_pairs().any(|(k, v)| k == "page" && v.parse::<u64>().is_ok());

    if has_page_param {
        let pairs: Vec<(String, String)> = current
            .query_pairs()
            .map(|(k, v)| {
                let value = match (k.as_ref(), v.parse::<u64>()) {
                    ("page", Ok(n)) => (n + 1).to_string(),
                    _ => v.into_owned(),
                };
                (k.into_owned(), value)
            })
            .collect();

        let mut next = current.clone();
        next.query_pairs_mut().clear().extend_pairs(pairs);
        return Some(next);
    }

    let captures = PAGE_SEGMENT.captures(current.path())?;
    let whole = captures.get(0)?;
    let page: u64 = captures.get(1)?.as_str().parse().ok()?;

    let path = current.path();
    let new_path = format!(
        "{}/page/{}{}",
        &path[..whole.start()],
        page + 1,
        &path[whole.end()..]
    );

    let mut next = current.clone();
    next.set_path(&new_path);
    Some(next)
}
