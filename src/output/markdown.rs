//! Markdown run report
//!
//! This module renders a finished run as a markdown document: the source and
//! listing tallies, the failure breakdown, per-source outcomes, and what the
//! knowledge base knows.

use crate::knowledge::KnowledgeStats;
use crate::output::traits::{OutputResult, RunSummary, SourceOutcome};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report of a run
///
/// # Arguments
///
/// * `summary` - The finished run
/// * `knowledge` - Knowledge base totals after the run
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_report(
    summary: &RunSummary,
    knowledge: Option<&KnowledgeStats>,
    output_path: &Path,
) -> OutputResult<()> {
    let markdown = format_markdown_report(summary, knowledge);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    tracing::info!("Wrote run report to {}", output_path.display());
    Ok(())
}

/// Formats a run as markdown
pub fn format_markdown_report(summary: &RunSummary, knowledge: Option<&KnowledgeStats>) -> String {
    let mut md = String::new();

    md.push_str("# Broker Sieve Run Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Vertical**: {}\n", summary.vertical));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {} seconds\n",
        summary.duration_seconds()
    ));
    md.push_str(&format!("- **Status**: {}\n\n", summary.status.to_db_string()));

    md.push_str("## Sources\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Attempted | {} |\n", summary.sources_attempted));
    md.push_str(&format!("| Succeeded | {} |\n", summary.sources_succeeded));
    md.push_str(&format!("| Empty | {} |\n", summary.sources_empty));
    md.push_str(&format!("| Failed | {} |\n", summary.sources_failed));
    md.push_str(&format!("| Skipped | {} |\n\n", summary.sources_skipped));
    md.push_str(&format!(
        "Success rate: {:.1}%\n\n",
        summary.success_rate()
    ));

    md.push_str("## Listings\n\n");
    md.push_str(&format!("- **Emitted**: {}\n", summary.listings));
    md.push_str(&format!(
        "- **Filtered out by vertical**: {}\n",
        summary.filtered_out
    ));
    md.push_str(&format!("- **With price**: {}\n", summary.with_price));
    md.push_str(&format!("- **With revenue**: {}\n", summary.with_revenue));
    md.push_str(&format!("- **With cash flow**: {}\n\n", summary.with_cash_flow));

    md.push_str("## Patterns\n\n");
    md.push_str(&format!("- **Learned this run**: {}\n", summary.patterns_learned));
    md.push_str(&format!(
        "- **Predictions used**: {}\n",
        summary.predictions_used
    ));
    if let Some(stats) = knowledge {
        md.push_str(&format!("- **Known domains**: {}\n", stats.patterns));
        md.push_str(&format!(
            "- **Total successful scrapes**: {}\n",
            stats.total_scrapes
        ));
        md.push_str(&format!(
            "- **Total listings learned from**: {}\n",
            stats.total_listings
        ));
    }
    md.push('\n');

    if !summary.failures_by_type.is_empty() {
        md.push_str("## Failures by Type\n\n");
        md.push_str("| Type | Count |\n");
        md.push_str("|------|-------|\n");
        for (kind, count) in &summary.failures_by_type {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
    }

    if !summary.reports.is_empty() {
        md.push_str("## Per-Source Results\n\n");
        md.push_str("| Source | Outcome | Pages | Listings | Stopped |\n");
        md.push_str("|--------|---------|-------|----------|---------|\n");
        for report in &summary.reports {
            let outcome = match report.outcome {
                SourceOutcome::Succeeded => "succeeded".to_string(),
                SourceOutcome::Empty => "empty".to_string(),
                SourceOutcome::Failed(kind) => format!("failed ({})", kind),
                SourceOutcome::Skipped => "skipped".to_string(),
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                escape_cell(&report.source_name),
                outcome,
                report.pages,
                report.listings,
                report.stop_reason.map(|r| r.as_str()).unwrap_or("-")
            ));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::traits::{SourceReport, StopReason};
    use crate::state::FailureType;
    use crate::storage::RunStatus;
    use chrono::Utc;

    fn create_test_summary() -> RunSummary {
        let mut ok = SourceReport::new("1", "Acme | Partners", "https://acme.com/");
        ok.outcome = SourceOutcome::Succeeded;
        ok.pages = 3;
        ok.listings = 42;
        ok.stop_reason = Some(StopReason::NoNextPage);

        let mut blocked = SourceReport::new("2", "Fortress", "https://fortress.com/");
        blocked.outcome = SourceOutcome::Failed(FailureType::Blocked);
        blocked.pages = 1;

        RunSummary::from_reports(3, "cleaning", RunStatus::Completed, Utc::now(), vec![ok, blocked])
    }

    #[test]
    fn test_format_markdown_report() {
        let md = format_markdown_report(&create_test_summary(), None);
        assert!(md.contains("# Broker Sieve Run Report"));
        assert!(md.contains("- **Run ID**: 3"));
        assert!(md.contains("| Succeeded | 1 |"));
        assert!(md.contains("| BLOCKED | 1 |"));
        assert!(md.contains("failed (BLOCKED)"));
        assert!(md.contains("Acme \\| Partners"));
        assert!(!md.contains("Known domains"));
    }

    #[test]
    fn test_report_includes_knowledge() {
        let stats = KnowledgeStats {
            patterns: 7,
            total_scrapes: 19,
            total_listings: 400,
            domains: vec![],
        };
        let md = format_markdown_report(&create_test_summary(), Some(&stats));
        assert!(md.contains("- **Known domains**: 7"));
    }

    #[test]
    fn test_generate_markdown_report_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        generate_markdown_report(&create_test_summary(), None, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Broker Sieve Run Report"));
    }
}
