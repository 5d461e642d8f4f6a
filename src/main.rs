//! broker-sieve main entry point
//!
//! This is the command-line interface for the broker-sieve listing extractor.

use anyhow::Context;
use broker_sieve::config::{load_config_with_hash, Config};
use broker_sieve::output::{
    generate_markdown_report, load_statistics, print_knowledge_stats, print_statistics,
    print_summary,
};
use broker_sieve::storage::open_storage;
use broker_sieve::Coordinator;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// broker-sieve: an adaptive business-for-sale listing extractor
///
/// broker-sieve crawls broker websites, learns the repeating listing-card
/// structure of each one, and stores the listings that match the configured
/// vertical.
#[derive(Parser, Debug)]
#[command(name = "broker-sieve")]
#[command(version)]
#[command(about = "An adaptive business-for-sale listing extractor", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only show warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and list the sources without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_run(config, config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("broker_sieve=info,warn"),
            1 => EnvFilter::new("broker_sieve=debug,info"),
            2 => EnvFilter::new("broker_sieve=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== broker-sieve Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Page cap per source: {}", config.crawler.max_pages);
    println!("  Workers: {}", config.crawler.workers);
    println!(
        "  Consecutive empty pages before stopping: {}",
        config.crawler.consecutive_empty_limit
    );
    println!(
        "  Page delay: {}-{}ms",
        config.crawler.page_delay_min_ms, config.crawler.page_delay_max_ms
    );

    println!("\nDetector:");
    println!(
        "  Depth band: {}-{}",
        config.detector.min_depth, config.detector.max_depth
    );
    println!("  Minimum group size: {}", config.detector.min_group_size);
    println!("  Minimum card text: {}", config.detector.min_card_text);

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Max attempts: {}", config.http.max_attempts);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);

    println!("\nVertical: {}", config.vertical.label());
    if !config.vertical.include.is_empty() {
        println!("  Include: {}", config.vertical.include.join(", "));
    }
    if !config.vertical.exclude.is_empty() {
        println!("  Exclude: {}", config.vertical.exclude.join(", "));
    }

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        let lane = if source.render { " [render]" } else { "" };
        println!("  - {} {}{}", source.id, source.name, lane);
        println!("    * {}", source.url);
    }

    let rendered = config.sources.iter().filter(|s| s.render).count();
    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl {} source(s), {} through the render lane",
        config.sources.len(),
        rendered
    );
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open {}", config.output.database_path))?;
    let stats = load_statistics(&storage).context("failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main run
async fn handle_run(config: Config, config_hash: String) -> anyhow::Result<()> {
    let summary_path = PathBuf::from(&config.output.summary_path);

    tracing::info!(
        "Sources: {}, vertical: {}",
        config.sources.len(),
        config.vertical.label()
    );

    let coordinator =
        Coordinator::new(config, config_hash).context("failed to initialize the crawler")?;

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the run early");
            cancel.cancel();
        }
    });

    let summary = coordinator.run().await.context("run failed")?;

    print_summary(&summary);
    let knowledge = coordinator.knowledge().stats();
    print_knowledge_stats(&knowledge);

    if let Err(e) = generate_markdown_report(&summary, Some(&knowledge), &summary_path) {
        tracing::warn!("Failed to write run report: {}", e);
    }

    Ok(())
}
