//! Scheduling of sources and pacing of requests
//!
//! This module handles:
//! - Splitting sources into the concurrent plain-HTTP lane and the
//!   sequential render lane
//! - Jittered delays between pages of one source and between rendered sources
//! - Cancellation-aware sleeping

use crate::config::{CrawlerConfig, Source};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A closed range of milliseconds a delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// Delay between two pages of the same source
    pub fn between_pages(config: &CrawlerConfig) -> Self {
        Self::new(config.page_delay_min_ms, config.page_delay_max_ms)
    }

    /// Delay between two render-requiring sources
    pub fn politeness(config: &CrawlerConfig) -> Self {
        Self::new(config.politeness_min_ms, config.politeness_max_ms)
    }

    /// Draws a uniformly random delay from the range
    pub fn sample(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    /// Sleeps for a sampled delay
    ///
    /// # Returns
    ///
    /// `false` if the run was cancelled while waiting
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        let delay = self.sample();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Sources grouped by how they must be fetched
#[derive(Debug, Default)]
pub struct Lanes {
    /// Plain fetches, crawled by the worker pool
    pub simple: Vec<Source>,
    /// Sources needing a rendering context, crawled one at a time
    pub rendered: Vec<Source>,
}

impl Lanes {
    pub fn split(sources: &[Source]) -> Self {
        let (rendered, simple): (Vec<Source>, Vec<Source>) =
            sources.iter().cloned().partition(|s| s.render);

        tracing::info!(
            "Scheduling {} simple source(s) and {} render source(s)",
            simple.len(),
            rendered.len()
        );

        Self { simple, rendered }
    }
}
