//! Heuristic field parsers for listing text
//!
//! Every parser is best-effort: a field that cannot be found is `None`, never
//! an error.

use super::dom;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

/// Revenue below this is treated as a misread (a fee, a unit price)
pub const MIN_REVENUE: f64 = 10_000.0;

/// Cash flow below this is treated as a misread
pub const MIN_CASH_FLOW: f64 = 1_000.0;

const TITLE_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "strong", "b"];
const TITLE_MIN_CHARS: usize = 10;
const TITLE_MAX_CHARS: usize = 200;
const TITLE_FALLBACK_CHARS: usize = 100;

const REVENUE_KEYWORDS: &[&str] = &["revenue", "gross sales", "annual sales", "sales"];
const CASH_FLOW_KEYWORDS: &[&str] = &["cash flow", "net income", "ebitda", "sde", "owner benefit"];

/// Ordered keyword buckets; the first bucket with a hit wins
const BUSINESS_TYPES: &[(&str, &[&str])] = &[
    ("restaurant", &["restaurant", "cafe", "diner", "bistro"]),
    ("bar", &["bar", "tavern", "pub", "lounge"]),
    ("retail", &["store", "shop", "boutique"]),
    ("service", &["salon", "spa", "cleaning"]),
];

const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

/// Amount with an optional `k`/`m`/`mm`/`million` suffix
///
/// The amount must be followed by a non-word character other than `&`, so
/// "$350,000 M&A" reads as $350,000 rather than $350,000 million.
const AMOUNT: &str = r"\d[\d,]*(?:\.\d+)?(?:\s?(?:million|mm|[km]))?";
const AMOUNT_END: &str = r"(?:[^\w&]|$)";

static PRICE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(\$\s?{}){}", AMOUNT, AMOUNT_END))
        .expect("hardcoded regex pattern is valid")
});

static CITY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*),\s*([A-Z]{2})\b")
        .expect("hardcoded regex pattern is valid")
});

static BARE_STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2})\b").expect("hardcoded regex pattern is valid"));

static REAL_ESTATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bmls\s*#|\bidx\b|\d+\s*bed.*\d+\s*bath").expect("hardcoded regex pattern is valid")
});

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("hardcoded regex pattern is valid"));

static REVENUE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| keyword_patterns(REVENUE_KEYWORDS));

static CASH_FLOW_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| keyword_patterns(CASH_FLOW_KEYWORDS));

static BUSINESS_TYPE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    BUSINESS_TYPES
        .iter()
        .map(|(bucket, words)| {
            let pattern = format!(r"\b(?:{})s?\b", words.join("|"));
            (
                *bucket,
                Regex::new(&pattern).expect("hardcoded regex pattern is valid"),
            )
        })
        .collect()
});

/// `keyword: $1,234` style patterns with the amount in group 1
fn keyword_patterns(keywords: &[&str]) -> Vec<Regex> {
    keywords
        .iter()
        .map(|keyword| {
            let pattern = format!(
                r"\b{}[:\s]*\$?({}){}",
                regex::escape(keyword),
                AMOUNT,
                AMOUNT_END
            );
            Regex::new(&pattern).expect("hardcoded regex pattern is valid")
        })
        .collect()
}

/// Parses a money string into a number
///
/// Dollar signs, commas and whitespace are ignored; a trailing `k`
/// multiplies by a thousand and `m`, `mm` or `million` by a million.
/// Anything else is rejected.
///
/// # Examples
///
/// ```
/// use broker_sieve::extract::parse_money;
///
/// assert_eq!(parse_money("$12,345"), Some(12345.0));
/// assert_eq!(parse_money("45k"), Some(45000.0));
/// assert_eq!(parse_money("1.2m"), Some(1200000.0));
/// assert_eq!(parse_money("call for price"), None);
/// ```
pub fn parse_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    let (number, multiplier) = if let Some(n) = cleaned.strip_suffix('k') {
        (n, 1_000.0)
    } else if let Some(n) = cleaned
        .strip_suffix("million")
        .or_else(|| cleaned.strip_suffix("mm"))
    {
        (n, 1_000_000.0)
    } else if let Some(n) = cleaned.strip_suffix('m') {
        (n, 1_000_000.0)
    } else {
        (cleaned.as_str(), 1.0)
    };

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let value = number.parse::<f64>().ok()? * multiplier;
    value.is_finite().then_some(value)
}

/// Finds the largest dollar amount in the text
///
/// # Returns
///
/// The amount as written and its parsed value, or `None` when the text
/// carries no parseable amount
pub fn extract_price(text: &str) -> Option<(String, f64)> {
    PRICE_AMOUNT
        .captures_iter(text)
        .filter_map(|caps| {
            let raw = caps[1].trim_end_matches(',').to_string();
            parse_money(&raw).map(|value| (raw, value))
        })
        .fold(None, |best: Option<(String, f64)>, (raw, value)| match best {
            Some((_, best_value)) if best_value >= value => best,
            _ => Some((raw, value)),
        })
}

/// Location found in listing text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// `City, ST`, or just `ST` when no city was found
    pub display: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

fn is_state_code(code: &str) -> bool {
    US_STATES.contains(&code)
}

/// Finds the first `City Name, ST` in the text, else a bare state code
pub fn extract_location(text: &str) -> Option<Location> {
    for caps in CITY_STATE.captures_iter(text) {
        let city = caps[1].trim().to_string();
        let state = caps[2].to_string();
        if is_state_code(&state) {
            return Some(Location {
                display: format!("{}, {}", city, state),
                city: Some(city),
                state: Some(state),
            });
        }
    }

    BARE_STATE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .find(|code| is_state_code(code))
        .map(|state| Location {
            display: state.clone(),
            city: None,
            state: Some(state),
        })
}

fn first_amount(text: &str, patterns: &[Regex], floor: f64) -> Option<f64> {
    let lowered = text.to_lowercase();
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(&lowered)
            .and_then(|caps| parse_money(&caps[1]))
            .filter(|value| *value >= floor)
    })
}

/// Annual revenue from `revenue:` / `gross sales:` style phrases
pub fn extract_revenue(text: &str) -> Option<f64> {
    first_amount(text, &REVENUE_PATTERNS, MIN_REVENUE)
}

/// Cash flow from `cash flow:` / `ebitda:` / `sde:` style phrases
pub fn extract_cash_flow(text: &str) -> Option<f64> {
    first_amount(text, &CASH_FLOW_PATTERNS, MIN_CASH_FLOW)
}

/// Coarse business type bucket, matched on whole words
pub fn classify_business_type(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    BUSINESS_TYPE_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&lowered))
        .map(|(bucket, _)| *bucket)
}

/// True for residential real-estate text (MLS numbers, IDX feeds, bed/bath counts)
pub fn is_real_estate(text: &str) -> bool {
    REAL_ESTATE.is_match(text)
}

fn title_sized(text: &str) -> bool {
    let chars = text.chars().count();
    (TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&chars)
}

/// Picks a human-readable title for a card
///
/// Tries, in order: the first heading-like descendant (`h1`..`h6`, `strong`,
/// `b`) of title size, the first link text of title size, the first
/// sentence of title size, and finally the first 100 characters.
pub fn extract_title(element: ElementRef<'_>, text: &str) -> String {
    for tag in TITLE_TAGS {
        if let Ok(selector) = Selector::parse(tag) {
            if let Some(heading) = element.select(&selector).next() {
                let heading_text = dom::visible_text(heading);
                if title_sized(&heading_text) {
                    return heading_text;
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("a") {
        if let Some(link) = element.select(&selector).next() {
            let link_text = dom::visible_text(link);
            if title_sized(&link_text) {
                return link_text;
            }
        }
    }

    if let Some(sentence) = SENTENCE_BREAK
        .split(text)
        .map(str::trim)
        .find(|s| title_sized(s))
    {
        return sentence.to_string();
    }

    text.chars().take(TITLE_FALLBACK_CHARS).collect()
}
