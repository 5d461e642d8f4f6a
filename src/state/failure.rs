//! Failure taxonomy and classifier
//!
//! Every source that cannot be read ends up as exactly one [`FailureRecord`]
//! whose [`FailureType`] says what to do about it: blocked sources need a
//! different fetch strategy, dead URLs need updating, pattern failures need a
//! look at the page.

use chrono::{DateTime, Utc};
use std::fmt;

/// Pages shorter than this are assumed to need JavaScript rendering
pub const RENDER_INSUFFICIENT_BYTES: usize = 10_000;

/// Raw error text kept in an `Unknown` classification
pub const UNKNOWN_DETAIL_CHARS: usize = 200;

/// Longest detail stored on a failure record
pub const MAX_DETAIL_CHARS: usize = 500;

/// Why a source could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureType {
    /// HTTP 403 or a CAPTCHA wall
    Blocked,
    /// HTTP 404
    NotFound,
    /// HTTP 5xx after retries
    ServerError,
    /// Request timed out after retries
    Timeout,
    /// TLS handshake or certificate problem
    TlsError,
    /// Page fetched but no repeating listing structure found
    NoPattern,
    /// Page too small to hold listings; probably rendered client-side
    RenderInsufficient,
    /// Anything else
    Unknown,
}

impl FailureType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Blocked => "BLOCKED",
            Self::NotFound => "NOT_FOUND",
            Self::ServerError => "SERVER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::TlsError => "TLS_ERROR",
            Self::NoPattern => "NO_PATTERN",
            Self::RenderInsufficient => "RENDER_INSUFFICIENT",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "BLOCKED" => Some(Self::Blocked),
            "NOT_FOUND" => Some(Self::NotFound),
            "SERVER_ERROR" => Some(Self::ServerError),
            "TIMEOUT" => Some(Self::Timeout),
            "TLS_ERROR" => Some(Self::TlsError),
            "NO_PATTERN" => Some(Self::NoPattern),
            "RENDER_INSUFFICIENT" => Some(Self::RenderInsufficient),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn all_types() -> Vec<Self> {
        vec![
            Self::Blocked,
            Self::NotFound,
            Self::ServerError,
            Self::Timeout,
            Self::TlsError,
            Self::NoPattern,
            Self::RenderInsufficient,
            Self::Unknown,
        ]
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Classifies a failed source
///
/// Checks run in a fixed order and the first hit wins:
/// 1. HTTP status: 403, 404, then any 5xx
/// 2. Error text: timeouts, then TLS/certificate problems
/// 3. CAPTCHA markers in the page
/// 4. "no pattern" / "no business listings" in the error text
/// 5. A page body under 10 KB
/// 6. Unknown, carrying the first 200 characters of the error text
///
/// # Arguments
///
/// * `error_text` - Error message or description of what went wrong
/// * `http_status` - Final HTTP status, if a response was received
/// * `page` - Raw page HTML, if a page was received
///
/// # Returns
///
/// The failure type and a short human-readable detail
///
/// # Examples
///
/// ```
/// use broker_sieve::{classify, FailureType};
///
/// let (kind, _) = classify("request failed", Some(403), None);
/// assert_eq!(kind, FailureType::Blocked);
/// ```
pub fn classify(
    error_text: &str,
    http_status: Option<u16>,
    page: Option<&str>,
) -> (FailureType, String) {
    match http_status {
        Some(403) => {
            return (
                FailureType::Blocked,
                "Site blocking (403), anti-bot protection".to_string(),
            )
        }
        Some(404) => {
            return (
                FailureType::NotFound,
                "Page not found (404), URL may be outdated".to_string(),
            )
        }
        Some(status) if status >= 500 => {
            return (
                FailureType::ServerError,
                format!("Server error ({})", status),
            )
        }
        _ => {}
    }

    let error_lower = error_text.to_lowercase();

    if error_lower.contains("timeout") || error_lower.contains("timed out") {
        return (FailureType::Timeout, "Connection timeout".to_string());
    }

    if ["ssl", "certificate", "tls"]
        .iter()
        .any(|marker| error_lower.contains(marker))
    {
        return (FailureType::TlsError, "SSL certificate error".to_string());
    }

    if let Some(html) = page {
        if html.to_lowercase().contains("captcha") {
            return (
                FailureType::Blocked,
                "CAPTCHA protection detected".to_string(),
            );
        }
    }

    if error_lower.contains("no pattern") || error_lower.contains("no business listings") {
        return (
            FailureType::NoPattern,
            "Could not detect listing pattern".to_string(),
        );
    }

    if let Some(html) = page {
        if html.len() < RENDER_INSUFFICIENT_BYTES {
            return (
                FailureType::RenderInsufficient,
                format!("Minimal content ({} bytes), likely rendered client-side", html.len()),
            );
        }
    }

    let truncated: String = error_text.chars().take(UNKNOWN_DETAIL_CHARS).collect();
    (FailureType::Unknown, format!("Unknown: {}", truncated))
}

/// One unrecoverable source failure
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub source_id: String,
    pub source_name: String,
    pub url: String,
    pub failure_type: FailureType,
    pub detail: String,
    pub http_status: Option<u16>,
    pub failed_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Builds a record, truncating the detail to [`MAX_DETAIL_CHARS`]
    pub fn new(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        url: impl Into<String>,
        failure_type: FailureType,
        detail: &str,
        http_status: Option<u16>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_name: source_name.into(),
            url: url.into(),
            failure_type,
            detail: detail.chars().take(MAX_DETAIL_CHARS).collect(),
            http_status,
            failed_at: Utc::now(),
        }
    }
}
