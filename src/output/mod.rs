//! Output module for run summaries and reports
//!
//! This module handles:
//! - Per-source reports and the run tally
//! - Console summaries of a run and of the listing database
//! - The markdown run report

mod markdown;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{
    load_statistics, print_knowledge_stats, print_statistics, print_summary, DatabaseStatistics,
};
pub use traits::{
    OutputError, OutputResult, RunSummary, SourceOutcome, SourceReport, StopReason,
};
