use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use broker_sieve::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Computes the knowledge-base key for a page URL
///
/// The key is the lowercase host with a leading `www.` stripped, so that
/// `https://www.Acme.com/listings` and `http://acme.com/` share one record.
///
/// # Arguments
///
/// * `url_str` - Any absolute URL string
///
/// # Returns
///
/// * `Some(String)` - The domain key
/// * `None` - If the string does not parse or has no host
///
/// # Examples
///
/// ```
/// use broker_sieve::url::domain_key;
///
/// assert_eq!(domain_key("https://www.Acme.com/x"), Some("acme.com".to_string()));
/// assert_eq!(domain_key("not a url"), None);
/// ```
pub fn domain_key(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    let host = extract_domain(&url)?;
    match host.strip_prefix("www.") {
        Some(stripped) if !stripped.is_empty() => Some(stripped.to_string()),
        _ => Some(host),
    }
}
