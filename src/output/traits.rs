//! Output types
//!
//! Per-source reports produced by the crawler and the run-level tally built
//! from them.

use crate::state::FailureType;
use crate::storage::RunStatus;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Why a source stopped paginating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PageCap,
    NoNextPage,
    NoPattern,
    ConsecutiveEmpty,
    AlreadyVisited,
    FetchFailed,
    TabularFile,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageCap => "page cap reached",
            Self::NoNextPage => "no next page",
            Self::NoPattern => "no pattern on page",
            Self::ConsecutiveEmpty => "consecutive pages without new listings",
            Self::AlreadyVisited => "next page already visited",
            Self::FetchFailed => "fetch failed after first page",
            Self::TabularFile => "listings read from downloadable file",
            Self::Cancelled => "run cancelled",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    /// At least one listing was accepted
    Succeeded,
    /// The source was read but nothing matched the vertical
    Empty,
    /// The source could not be read
    Failed(FailureType),
    /// The run was cancelled before the source started
    Skipped,
}

/// What happened to one source during a run
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source_id: String,
    pub source_name: String,
    pub url: String,
    pub outcome: SourceOutcome,
    pub stop_reason: Option<StopReason>,
    pub pages: u32,

    /// New listings accepted and stored
    pub listings: u64,
    /// Listings rejected by the vertical filter
    pub filtered_out: u64,
    pub with_price: u64,
    pub with_revenue: u64,
    pub with_cash_flow: u64,

    /// Signature that produced the listings, if any
    pub pattern: Option<String>,
    pub pattern_learned: bool,
    pub prediction_used: bool,
}

impl SourceReport {
    pub fn new(source_id: &str, source_name: &str, url: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            url: url.to_string(),
            outcome: SourceOutcome::Skipped,
            stop_reason: None,
            pages: 0,
            listings: 0,
            filtered_out: 0,
            with_price: 0,
            with_revenue: 0,
            with_cash_flow: 0,
            pattern: None,
            pattern_learned: false,
            prediction_used: false,
        }
    }
}

/// Tally of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub vertical: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    pub sources_attempted: u64,
    pub sources_succeeded: u64,
    pub sources_empty: u64,
    pub sources_failed: u64,
    pub sources_skipped: u64,

    pub listings: u64,
    pub filtered_out: u64,
    pub with_price: u64,
    pub with_revenue: u64,
    pub with_cash_flow: u64,

    pub patterns_learned: u64,
    pub predictions_used: u64,

    pub failures_by_type: BTreeMap<FailureType, u64>,

    /// Per-source detail, in source order
    pub reports: Vec<SourceReport>,
}

impl RunSummary {
    /// Builds the run tally from per-source reports
    pub fn from_reports(
        run_id: i64,
        vertical: &str,
        status: RunStatus,
        started_at: DateTime<Utc>,
        reports: Vec<SourceReport>,
    ) -> Self {
        let mut summary = Self {
            run_id,
            vertical: vertical.to_string(),
            status,
            started_at,
            finished_at: Utc::now(),
            sources_attempted: 0,
            sources_succeeded: 0,
            sources_empty: 0,
            sources_failed: 0,
            sources_skipped: 0,
            listings: 0,
            filtered_out: 0,
            with_price: 0,
            with_revenue: 0,
            with_cash_flow: 0,
            patterns_learned: 0,
            predictions_used: 0,
            failures_by_type: BTreeMap::new(),
            reports: Vec::new(),
        };

        for report in &reports {
            match report.outcome {
                SourceOutcome::Succeeded => summary.sources_succeeded += 1,
                SourceOutcome::Empty => summary.sources_empty += 1,
                SourceOutcome::Failed(kind) => {
                    summary.sources_failed += 1;
                    *summary.failures_by_type.entry(kind).or_insert(0) += 1;
                }
                SourceOutcome::Skipped => {
                    summary.sources_skipped += 1;
                    continue;
                }
            }

            summary.sources_attempted += 1;
            summary.listings += report.listings;
            summary.filtered_out += report.filtered_out;
            summary.with_price += report.with_price;
            summary.with_revenue += report.with_revenue;
            summary.with_cash_flow += report.with_cash_flow;
            summary.patterns_learned += u64::from(report.pattern_learned);
            summary.predictions_used += u64::from(report.prediction_used);
        }

        summary.reports = reports;
        summary
    }

    /// Share of attempted sources that produced listings, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.sources_attempted == 0 {
            return 0.0;
        }
        (self.sources_succeeded as f64 / self.sources_attempted as f64) * 100.0
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}
