//! HTTP fetcher implementation
//!
//! This module handles every network request the crawler makes:
//! - Building the HTTP client from the `[http]` config section
//! - The [`FetchRender`] capability the coordinator depends on
//! - Retry with exponential backoff and jitter on 429, 5xx and transport errors
//! - Error classification into [`FetchError`]

use crate::config::HttpConfig;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum random jitter added to each backoff delay (milliseconds)
const MAX_JITTER_MS: u64 = 400;

/// Errors that end a fetch after retries are exhausted
///
/// Messages never contain the request URL; they are matched against failure
/// keywords, and a host name like `sslbrokers.com` must not read as one.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("SSL certificate error: {0}")]
    Tls(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// HTTP status carried by the error, if the server answered
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            return Self::Timeout(err.to_string());
        }

        let chain = error_chain(&err).to_lowercase();
        if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
            Self::Tls(chain)
        } else {
            Self::Transport(chain)
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Tls(_) | Self::Cancelled => false,
        }
    }
}

/// A fetched page: where it ended up, how the server answered, and its markup
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// Final URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub html: String,
}

/// Capability to fetch a page (rendering it if needed) and download files
///
/// The coordinator only talks to this trait, so a browser-backed renderer
/// can be swapped in for sources that need JavaScript.
#[async_trait]
pub trait FetchRender: Send + Sync {
    /// Fetches `url` and returns the page as HTML
    async fn fetch_render(&self, url: &Url) -> Result<PageSnapshot, FetchError>;

    /// Downloads the raw bytes at `url`
    async fn download_file(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The `[http]` configuration section
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Delay before retry number `attempt` (1-based)
///
/// `min(cap, base × 2^(attempt-1))` plus up to 400 ms of random jitter.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let scaled = base.saturating_mul(1u32 << exponent);
    let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
    scaled.min(cap) + Duration::from_millis(jitter)
}

fn is_retryable_status(status: u16) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(&status)
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Plain HTTP implementation of [`FetchRender`]
///
/// Does not execute JavaScript; pages that render client-side come back
/// nearly empty and are classified accordingly.
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            config: config.clone(),
        })
    }

    /// Sends a GET, retrying transient failures
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return the response |
    /// | 429, 5xx | Retry with backoff, then `Status` |
    /// | Timeout, connection error | Retry with backoff |
    /// | TLS error | Immediate `Tls` |
    /// | Any other status | Immediate `Status` |
    async fn get_with_retry(&self, url: &Url) -> Result<Response, FetchError> {
        let base = Duration::from_millis(self.config.backoff_base_ms);
        let cap = Duration::from_millis(self.config.backoff_cap_ms);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match self.client.get(url.clone()).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => FetchError::Status {
                    status: response.status().as_u16(),
                },
                Err(e) => FetchError::from_reqwest(e),
            };

            if !err.is_retryable() || attempt >= max_attempts {
                tracing::debug!("Giving up on {} after {} attempt(s): {}", url, attempt, err);
                return Err(err);
            }

            let delay = backoff_delay(attempt, base, cap);
            tracing::warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                max_attempts,
                url,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl FetchRender for HttpFetcher {
    async fn fetch_render(&self, url: &Url) -> Result<PageSnapshot, FetchError> {
        let response = self.get_with_retry(url).await?;
        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let html = response.text().await.map_err(FetchError::from_reqwest)?;

        tracing::debug!("Fetched {} ({} bytes, HTTP {})", final_url, html.len(), status);

        Ok(PageSnapshot {
            final_url,
            status,
            html,
        })
    }

    async fn download_file(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self.get_with_retry(url).await?;
        let bytes = response.bytes().await.map_err(FetchError::from_reqwest)?;
        tracing::debug!("Downloaded {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&HttpConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(800);
        let cap = Duration::from_millis(12_000);
        let jitter = Duration::from_millis(MAX_JITTER_MS);

        let first = backoff_delay(1, base, cap);
        assert!(first >= base && first <= base + jitter);

        let third = backoff_delay(3, base, cap);
        assert!(third >= Duration::from_millis(3200));
        assert!(third <= Duration::from_millis(3200) + jitter);

        let tenth = backoff_delay(10, base, cap);
        assert!(tenth >= cap && tenth <= cap + jitter);
    }

    #[test]
    fn test_backoff_huge_attempt_does_not_overflow() {
        let delay = backoff_delay(u32::MAX, Duration::from_secs(1), Duration::from_secs(5));
        assert!(delay <= Duration::from_secs(5) + Duration::from_millis(MAX_JITTER_MS));
    }

    #[test]
    fn test_status_message_classifies_without_url() {
        let err = FetchError::Status { status: 410 };
        assert_eq!(err.to_string(), "HTTP 410");

        let (kind, _) = crate::state::classify(&err.to_string(), err.http_status(), None);
        assert_eq!(kind, crate::state::FailureType::Unknown);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(403));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn test_error_display_feeds_classifier() {
        use crate::state::{classify, FailureType};

        let timeout = FetchError::Timeout("operation".to_string());
        assert_eq!(classify(&timeout.to_string(), None, None).0, FailureType::Timeout);

        let tls = FetchError::Tls("invalid peer".to_string());
        assert_eq!(classify(&tls.to_string(), None, None).0, FailureType::TlsError);

        let blocked = FetchError::Status { status: 403 };
        assert_eq!(blocked.http_status(), Some(403));
        assert_eq!(
            classify(&blocked.to_string(), blocked.http_status(), None).0,
            FailureType::Blocked
        );
    }
}
