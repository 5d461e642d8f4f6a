//! Listing records and the per-card extractor

use super::{dom, fields};
use crate::config::Source;
use crate::url::canonical_listing_url;
use chrono::{DateTime, Utc};
use scraper::ElementRef;
use sha2::{Digest, Sha256};
use url::Url;

/// Cards with less visible text than this are navigation or decoration
pub const MIN_LISTING_TEXT: usize = 30;

/// Length of the text excerpt kept with each listing
pub const SNIPPET_CHARS: usize = 500;

/// Link prefixes that never lead to a listing page
const EXCLUDED_HREF_PREFIXES: &[&str] = &["#", "javascript:", "mailto:", "tel:"];

/// Path fragments of site pages that are not listings
const EXCLUDED_PATHS: &[&str] = &["/contact", "/about"];

/// Typed fields pulled out of one listing card or spreadsheet row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedListing {
    pub title: String,
    pub url: Option<String>,
    pub price_raw: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub business_type: Option<String>,
    pub revenue: Option<f64>,
    pub cash_flow: Option<f64>,
    pub snippet: String,
}

impl ExtractedListing {
    /// Lower-cased text used by keyword filters
    pub fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.snippet,
            self.business_type.as_deref().unwrap_or_default()
        )
        .to_lowercase()
    }
}

/// A listing ready to be stored, with its stable identifier
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedListing {
    pub id: String,
    pub listing: ExtractedListing,
    pub source_id: String,
    pub source_name: String,
    pub vertical: String,
    pub run_id: i64,
    pub scraped_at: DateTime<Utc>,
}

impl NormalizedListing {
    pub fn new(listing: ExtractedListing, source: &Source, vertical: &str, run_id: i64) -> Self {
        Self {
            id: listing_id(&listing, &source.id),
            listing,
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            vertical: vertical.to_string(),
            run_id,
            scraped_at: Utc::now(),
        }
    }
}

/// Computes the content-addressed identifier of a listing
///
/// The identifier is the SHA-256 (hex) of the canonical listing URL. When a
/// listing has no usable URL, the composite key
/// `title|location|price|source` is hashed instead. The same listing always
/// produces the same identifier, across runs and processes.
pub fn listing_id(listing: &ExtractedListing, source_id: &str) -> String {
    let key = listing
        .url
        .as_deref()
        .and_then(canonical_listing_url)
        .unwrap_or_else(|| {
            format!(
                "{}|{}|{}|{}",
                listing.title.trim().to_lowercase(),
                listing.location.as_deref().unwrap_or_default(),
                listing.price.map(|p| p.to_string()).unwrap_or_default(),
                source_id
            )
        });

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolves a card's link against the page URL and applies the exclusion list
fn resolve_listing_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    let lowered = href.to_lowercase();
    if href.is_empty() || EXCLUDED_HREF_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return None;
    }

    let resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    let path = resolved.path().to_lowercase();
    if EXCLUDED_PATHS.iter().any(|p| path.contains(p)) {
        return None;
    }

    Some(resolved)
}

/// Extracts one listing from a matched card element
///
/// Returns `None` when the card is too small to be a listing, has no usable
/// link, or describes residential real estate.
///
/// # Arguments
///
/// * `element` - A member of the winning pattern
/// * `base` - Final URL of the page, used to resolve relative links
pub fn extract_listing(element: ElementRef<'_>, base: &Url) -> Option<ExtractedListing> {
    let text = dom::visible_text(element);
    if text.chars().count() < MIN_LISTING_TEXT {
        return None;
    }

    if fields::is_real_estate(&text) {
        tracing::trace!("Skipping real-estate card: {}", truncate(&text, 80));
        return None;
    }

    let url = resolve_listing_link(dom::find_link(element)?, base)?;

    let (price_raw, price) = match fields::extract_price(&text) {
        Some((raw, value)) => (Some(raw), Some(value)),
        None => (None, None),
    };
    let location = fields::extract_location(&text);

    Some(ExtractedListing {
        title: fields::extract_title(element, &text),
        url: Some(url.to_string()),
        price_raw,
        price,
        location: location.as_ref().map(|l| l.display.clone()),
        city: location.as_ref().and_then(|l| l.city.clone()),
        state: location.and_then(|l| l.state),
        business_type: fields::classify_business_type(&text).map(str::to_string),
        revenue: fields::extract_revenue(&text),
        cash_flow: fields::extract_cash_flow(&text),
        snippet: truncate(&text, SNIPPET_CHARS),
    })
}

/// Extracts every listing from a group of elements, skipping rejected cards
pub fn extract_all<'a>(
    elements: impl IntoIterator<Item = ElementRef<'a>>,
    base: &Url,
) -> Vec<ExtractedListing> {
    elements
        .into_iter()
        .filter_map(|el| extract_listing(el, base))
        .collect()
}

/// First `max` characters of a string
pub(crate) fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::extract::find_patterns;
    use scraper::{Html, Selector};

    fn base() -> Url {
        Url::parse("https://www.acmebrokers.com/listings?page=1").unwrap()
    }

    fn card(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    fn first_div(doc: &Html) -> ElementRef<'_> {
        let selector = Selector::parse("div").unwrap();
        doc.select(&selector).next().unwrap()
    }

    #[test]
    fn test_extract_full_card() {
        let doc = card(
            r#"<div><h3><a href="/listing/88">Established Commercial Cleaning Company</a></h3>
            <p>Asking $450,000. Revenue: $1,100,000. Cash flow: $180,000. Dallas, TX.</p></div>"#,
        );
        let listing = extract_listing(first_div(&doc), &base()).unwrap();

        assert_eq!(listing.title, "Established Commercial Cleaning Company");
        assert_eq!(
            listing.url.as_deref(),
            Some("https://www.acmebrokers.com/listing/88")
        );
        // Largest amount in the card
        assert_eq!(listing.price, Some(1100000.0));
        assert_eq!(listing.revenue, Some(1100000.0));
        assert_eq!(listing.cash_flow, Some(180000.0));
        assert_eq!(listing.location.as_deref(), Some("Dallas, TX"));
        assert_eq!(listing.city.as_deref(), Some("Dallas"));
        assert_eq!(listing.state.as_deref(), Some("TX"));
        assert_eq!(listing.business_type.as_deref(), Some("service"));
    }

    #[test]
    fn test_reject_short_text() {
        let doc = card(r#"<div><a href="/listing/1">Tiny card</a></div>"#);
        assert!(extract_listing(first_div(&doc), &base()).is_none());
    }

    #[test]
    fn test_reject_missing_link() {
        let doc = card("<div><p>A long description of a business without any link at all.</p></div>");
        assert!(extract_listing(first_div(&doc), &base()).is_none());
    }

    #[test]
    fn test_reject_excluded_links() {
        for href in ["#", "javascript:void(0)", "/contact-us", "/about", "mailto:broker@acme.com"] {
            let html = format!(
                r#"<div><a href="{}">Profitable landscaping company with long-term contracts</a></div>"#,
                href
            );
            let doc = card(&html);
            assert!(
                extract_listing(first_div(&doc), &base()).is_none(),
                "{} should be excluded",
                href
            );
        }
    }

    #[test]
    fn test_reject_real_estate() {
        let doc = card(
            r#"<div><a href="/homes/9">Lovely colonial, 3 bed 2 bath, asking $389,000 in Plano, TX</a></div>"#,
        );
        assert!(extract_listing(first_div(&doc), &base()).is_none());
    }

    #[test]
    fn test_real_estate_card_inside_valid_group() {
        let doc = Html::parse_document(
            r#"<html><body><div class="results">
            <div class="card"><a href="/l/1">Commercial cleaning company with 40 accounts for $300,000</a></div>
            <div class="card"><a href="/l/2">Mobile car wash business with two trucks for $120,000</a></div>
            <div class="card"><a href="/l/3">Pet grooming salon with loyal clients asking $210,000</a></div>
            <div class="card"><a href="/l/4">Lakefront cottage with 3 bed 2 bath listed at $499,000</a></div>
            </div></body></html>"#,
        );
        let detection = find_patterns(&doc, &DetectorConfig::default());
        let pattern = &detection.patterns()[0];
        assert_eq!(pattern.count(), 4);

        let listings = extract_all(pattern.elements.iter().copied(), &base());
        assert_eq!(listings.len(), 3);
        assert!(listings.iter().all(|l| !l.snippet.contains("bath")));
    }

    #[test]
    fn test_listing_id_stable() {
        let listing = ExtractedListing {
            title: "Bakery".to_string(),
            url: Some("https://www.acme.com/listing/5/?utm_source=x".to_string()),
            ..Default::default()
        };
        let same = ExtractedListing {
            url: Some("https://acme.com/listing/5".to_string()),
            ..listing.clone()
        };

        let id = listing_id(&listing, "1042");
        assert_eq!(id.len(), 64);
        assert_eq!(id, listing_id(&same, "1042"));
        // URL identity does not depend on the source
        assert_eq!(id, listing_id(&listing, "2001"));
    }

    #[test]
    fn test_listing_id_composite_key() {
        let listing = ExtractedListing {
            title: "Dry Cleaner".to_string(),
            location: Some("Tulsa, OK".to_string()),
            price: Some(150000.0),
            ..Default::default()
        };
        let id = listing_id(&listing, "1042");
        assert_eq!(id, listing_id(&listing.clone(), "1042"));
        assert_ne!(id, listing_id(&listing, "2001"));
    }

    #[test]
    fn test_normalized_listing_carries_source() {
        let source = Source::new("1042", "Acme", "https://acme.com/listings");
        let listing = ExtractedListing {
            title: "Bakery".to_string(),
            url: Some("https://acme.com/listing/5".to_string()),
            ..Default::default()
        };
        let normalized = NormalizedListing::new(listing.clone(), &source, "cleaning", 7);
        assert_eq!(normalized.id, listing_id(&listing, "1042"));
        assert_eq!(normalized.source_name, "Acme");
        assert_eq!(normalized.run_id, 7);
    }
}
