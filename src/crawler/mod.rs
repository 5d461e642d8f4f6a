//! Crawler module for fetching listing pages and driving extraction
//!
//! This module contains the core crawling logic, including:
//! - The fetch/render capability with retry and backoff
//! - Next-page discovery
//! - Source lanes and request pacing
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod pagination;
mod scheduler;

pub use coordinator::Coordinator;
pub use fetcher::{backoff_delay, build_http_client, FetchError, FetchRender, HttpFetcher, PageSnapshot};
pub use pagination::next_page_url;
pub use scheduler::{DelayRange, Lanes};

use crate::config::Config;
use crate::output::RunSummary;
use crate::Result;

/// Runs a complete crawl over every configured source
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash of the configuration file
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run finished (possibly with failed sources)
/// * `Err(SieveError)` - Storage or client initialization failed
///
/// # Example
///
/// ```no_run
/// use broker_sieve::config::load_config_with_hash;
/// use broker_sieve::crawler::crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("sieve.toml"))?;
/// let summary = crawl(config, hash).await?;
/// println!("{} listings", summary.listings);
/// # Ok(())
/// # }
/// ```
pub async fn crawl(config: Config, config_hash: String) -> Result<RunSummary> {
    let coordinator = Coordinator::new(config, config_hash)?;
    coordinator.run().await
}
