//! Statistics from the listing database and console summaries
//!
//! This module provides functionality for extracting statistics from the
//! storage layer and printing run and database summaries.

use crate::knowledge::KnowledgeStats;
use crate::output::traits::{OutputResult, RunSummary, SourceOutcome};
use crate::state::FailureType;
use crate::storage::{DomainPatternRecord, RunRecord, Storage};
use std::collections::HashMap;

/// Number of learned patterns listed by [`print_statistics`]
const TOP_PATTERNS: usize = 10;

/// Database statistics summary
#[derive(Debug, Clone)]
pub struct DatabaseStatistics {
    /// Distinct listings stored across all runs
    pub total_listings: u64,

    /// Listing count per source id, largest first
    pub listings_by_source: Vec<(String, u64)>,

    /// Learned domain patterns, most used first
    pub patterns: Vec<DomainPatternRecord>,

    /// Failure counts across all runs
    pub failure_breakdown: HashMap<FailureType, u64>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(DatabaseStatistics)` - Successfully loaded statistics
/// * `Err(OutputError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> OutputResult<DatabaseStatistics> {
    let total_listings = storage.count_listings()?;

    let mut listings_by_source = storage.count_listings_by_source()?;
    listings_by_source.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut patterns = storage.load_patterns()?;
    patterns.sort_by(|a, b| {
        b.success_count
            .cmp(&a.success_count)
            .then_with(|| a.domain.cmp(&b.domain))
    });

    Ok(DatabaseStatistics {
        total_listings,
        listings_by_source,
        patterns,
        failure_breakdown: storage.failure_breakdown()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints database statistics to stdout in a formatted manner
pub fn print_statistics(stats: &DatabaseStatistics) {
    println!("=== Listing Database Statistics ===\n");

    println!("Overview:");
    println!("  Total listings: {}", stats.total_listings);
    println!("  Sources with listings: {}", stats.listings_by_source.len());
    println!("  Learned patterns: {}", stats.patterns.len());
    if let Some(run) = &stats.latest_run {
        println!(
            "  Latest run: #{} started {} ({})",
            run.id,
            run.started_at,
            run.status.to_db_string()
        );
    }
    println!();

    if !stats.listings_by_source.is_empty() {
        println!("Listings by Source:");
        for (source_id, count) in &stats.listings_by_source {
            println!("  {}: {}", source_id, count);
        }
        println!();
    }

    if !stats.patterns.is_empty() {
        println!("Top Learned Patterns:");
        for pattern in stats.patterns.iter().take(TOP_PATTERNS) {
            println!(
                "  {} ({} successes, {} listings)",
                pattern.domain, pattern.success_count, pattern.total_listings
            );
            println!("    {}", pattern.pattern_signature);
        }
        println!();
    }

    if !stats.failure_breakdown.is_empty() {
        println!("Failures by Type:");
        let mut failures: Vec<_> = stats.failure_breakdown.iter().collect();
        failures.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (kind, count) in failures {
            println!("  {}: {}", kind, count);
        }
        println!();
    }
}

/// Prints the tally of a finished run
pub fn print_summary(summary: &RunSummary) {
    println!("\n=== Run #{} Summary ({}) ===\n", summary.run_id, summary.vertical);

    println!("Sources:");
    println!("  Attempted: {}", summary.sources_attempted);
    println!(
        "  Succeeded: {} ({:.1}%)",
        summary.sources_succeeded,
        summary.success_rate()
    );
    println!("  Empty: {}", summary.sources_empty);
    println!("  Failed: {}", summary.sources_failed);
    if summary.sources_skipped > 0 {
        println!("  Skipped (cancelled): {}", summary.sources_skipped);
    }
    println!();

    println!("Listings:");
    println!("  Emitted: {}", summary.listings);
    println!("  Filtered out by vertical: {}", summary.filtered_out);
    println!("  With price: {}", summary.with_price);
    println!("  With revenue: {}", summary.with_revenue);
    println!("  With cash flow: {}", summary.with_cash_flow);
    println!();

    println!("Patterns:");
    println!("  Learned: {}", summary.patterns_learned);
    println!("  Predictions used: {}", summary.predictions_used);
    println!();

    if !summary.failures_by_type.is_empty() {
        println!("Failures by Type:");
        for (kind, count) in &summary.failures_by_type {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    let failed: Vec<_> = summary
        .reports
        .iter()
        .filter(|r| matches!(r.outcome, SourceOutcome::Failed(_)))
        .collect();
    if !failed.is_empty() {
        println!("Failed Sources:");
        for report in failed {
            if let SourceOutcome::Failed(kind) = report.outcome {
                println!("  [{}] {} - {}", kind, report.source_name, report.url);
            }
        }
        println!();
    }

    println!(
        "Status: {} in {}s",
        summary.status.to_db_string(),
        summary.duration_seconds()
    );
}

/// Prints what the knowledge base has learned so far
pub fn print_knowledge_stats(stats: &KnowledgeStats) {
    println!("\nKnowledge Base:");
    println!("  Patterns: {}", stats.patterns);
    println!("  Total successful scrapes: {}", stats.total_scrapes);
    println!("  Total listings: {}", stats.total_listings);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Source;
    use crate::extract::{ExtractedListing, NormalizedListing};
    use crate::state::FailureRecord;
    use crate::storage::{FailureLog, ListingSink, PatternStore, RunLog, SqliteStorage};
    use chrono::Utc;

    fn listing(source: &Source, run_id: i64, path: &str) -> NormalizedListing {
        let extracted = ExtractedListing {
            title: "Commercial Cleaning Company".to_string(),
            url: Some(format!("https://acme.com{}", path)),
            ..Default::default()
        };
        NormalizedListing::new(extracted, source, "cleaning", run_id)
    }

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash", "cleaning").unwrap();

        let acme = Source::new("1", "Acme", "https://acme.com/");
        let other = Source::new("2", "Other", "https://other.com/");
        storage.upsert_listing(&listing(&acme, run_id, "/a")).unwrap();
        storage.upsert_listing(&listing(&acme, run_id, "/b")).unwrap();
        storage.upsert_listing(&listing(&other, run_id, "/c")).unwrap();

        let now = Utc::now();
        for (domain, successes) in [("small.com", 1), ("big.com", 4)] {
            storage
                .upsert_pattern(&DomainPatternRecord {
                    domain: domain.to_string(),
                    pattern_signature: "div|has_link".to_string(),
                    success_count: successes,
                    total_listings: 10,
                    first_seen: now,
                    last_used: now,
                })
                .unwrap();
        }

        let failure = FailureRecord::new("3", "Blocked", "https://x.com/", FailureType::Blocked, "403", Some(403));
        storage.record_failure(run_id, &failure).unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_listings, 3);
        assert_eq!(stats.listings_by_source[0], ("1".to_string(), 2));
        assert_eq!(stats.patterns[0].domain, "big.com");
        assert_eq!(stats.failure_breakdown[&FailureType::Blocked], 1);
        assert_eq!(stats.latest_run.unwrap().id, run_id);
    }

    #[test]
    fn test_load_statistics_empty_database() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_listings, 0);
        assert!(stats.patterns.is_empty());
        assert!(stats.latest_run.is_none());
    }
}
