//! URL handling module for broker-sieve
//!
//! This module provides URL normalization for listing identity and domain
//! keys for the pattern knowledge base.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{domain_key, extract_domain};
pub use normalize::{canonical_listing_url, normalize_url};
