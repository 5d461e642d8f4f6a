//! Listing extraction
//!
//! Pure, synchronous functions over parsed pages: structural signatures,
//! repeating-pattern detection, heuristic field parsing, the per-card
//! extractor, the vertical keyword filter and the CSV fallback.
//!
//! Nothing here performs I/O. `scraper::Html` is not `Send`, so callers parse
//! and extract inside a synchronous scope and only carry owned
//! [`ExtractedListing`] values across await points.

pub mod dom;
mod detector;
mod fields;
mod listing;
mod signature;
pub mod tabular;
mod vertical;

pub use detector::{find_patterns, select_by_signature, Detection, Pattern};
pub use fields::{
    classify_business_type, extract_cash_flow, extract_location, extract_price, extract_revenue,
    extract_title, is_real_estate, parse_money, Location, MIN_CASH_FLOW, MIN_REVENUE,
};
pub use listing::{
    extract_all, extract_listing, listing_id, ExtractedListing, NormalizedListing,
    MIN_LISTING_TEXT, SNIPPET_CHARS,
};
pub use signature::{element_signature, has_currency_amount, TextBucket};
