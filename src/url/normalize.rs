use crate::UrlError;
use url::Url;

/// Query parameters that never change which listing a URL points at
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "mc_eid", "msclkid", "ref", "sessionid", "sid",
];

/// Normalizes a URL so that two links to the same listing compare equal
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase the host and remove a `www.` prefix
/// 3. Remove dot segments, repeated and trailing slashes (root stays `/`)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters, sort the rest
///
/// The scheme is left as given.
///
/// # Examples
///
/// ```
/// use broker_sieve::url::normalize_url;
///
/// let url = normalize_url("https://WWW.ACME.COM/listing/42/?utm_source=mail").unwrap();
/// assert_eq!(url.as_str(), "https://acme.com/listing/42");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if let Some(host) = url.host_str() {
        let mut normalized_host = host.to_lowercase();

        if let Some(stripped) = normalized_host.strip_prefix("www.") {
            normalized_host = stripped.to_string();
        }

        url.set_host(Some(&normalized_host))
            .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    } else {
        return Err(UrlError::MissingDomain);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let filtered_params = filter_and_sort_query_params(&url);

        if filtered_params.is_empty() {
            url.set_query(None);
        } else {
            let query_string = filtered_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

/// Canonical form of a listing URL used for its identifier
///
/// Same as [`normalize_url`] except that a synthetic `#rowN` fragment
/// (produced for rows of downloaded spreadsheets) is preserved, since it is
/// the only thing distinguishing rows of one file.
///
/// Returns `None` for URLs that cannot be normalized.
pub fn canonical_listing_url(url_str: &str) -> Option<String> {
    let mut url = normalize_url(url_str).ok()?;

    let fragment = Url::parse(url_str)
        .ok()
        .and_then(|u| u.fragment().map(str::to_string));
    if let Some(fragment) = fragment.filter(|f| is_row_fragment(f)) {
        url.set_fragment(Some(&fragment));
    }

    Some(url.to_string())
}

fn is_row_fragment(fragment: &str) -> bool {
    fragment
        .strip_prefix("row")
        .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_preserved() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_remove_www() {
        let result = normalize_url("https://www.example.com/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://example.com/listing/17/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/listing/17");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#photos").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_remove_tracking_params() {
        let result =
            normalize_url("https://example.com/page?utm_source=a&fbclid=b&gclid=c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = normalize_url("https://example.com/detail?listing=9&b=2").unwrap();
        assert_eq!(result.as_str(), "https://example.com/detail?b=2&listing=9");
    }

    #[test]
    fn test_normalize_path_with_dots() {
        let result = normalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_multiple_slashes() {
        let result = normalize_url("https://example.com///path//to///page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/path/to/page");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_equivalent_listing_links_match() {
        let a = canonical_listing_url("https://www.acme.com/listing/42/?utm_campaign=x");
        let b = canonical_listing_url("https://acme.com/listing/42#gallery");
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn test_row_fragment_preserved() {
        let row3 = canonical_listing_url("https://acme.com/files/list.csv#row3").unwrap();
        let row4 = canonical_listing_url("https://acme.com/files/list.csv#row4").unwrap();
        assert_eq!(row3, "https://acme.com/files/list.csv#row3");
        assert_ne!(row3, row4);
    }

    #[test]
    fn test_non_row_fragment_dropped() {
        let url = canonical_listing_url("https://acme.com/files/list.csv#rows").unwrap();
        assert_eq!(url, "https://acme.com/files/list.csv");
    }
}
