//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock broker sites and run the full
//! fetch, detect, extract, store and learn cycle end-to-end against a
//! SQLite database in a temporary directory.

use broker_sieve::config::{
    load_config_with_hash, Config, CrawlerConfig, HttpConfig, OutputConfig, VerticalFilter,
};
use broker_sieve::crawler::{crawl, Coordinator};
use broker_sieve::output::{SourceOutcome, StopReason};
use broker_sieve::storage::{
    FailureLog, ListingSink, PatternStore, RunLog, RunStatus, SqliteStorage,
};
use broker_sieve::{FailureType, Source};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLEANING_TITLES: &[&str] = &[
    "Established Commercial Cleaning Company",
    "Profitable Residential Maid Service",
    "Janitorial Franchise With Contracts",
    "Carpet Cleaning Business With Van",
    "Window Cleaning Route In Suburbs",
];

const RESTAURANT_TITLES: &[&str] = &[
    "Family Restaurant With Liquor License",
    "Pizza Restaurant Near Campus",
    "Restaurant And Bar Downtown",
];

fn card(index: usize, title: &str) -> String {
    format!(
        r#"<div class="listing-card"><h3><a href="/listing/{}">{}</a></h3><p>Asking Price: $325,000. Cash Flow: $110,000. Gross Revenue: $480,000. Location: Tulsa, OK.</p></div>"#,
        index, title
    )
}

fn listings_page(titles: &[&str]) -> String {
    listings_page_from(1, titles, "")
}

/// A results page whose cards are numbered from `first` with `after` placed below the results
fn listings_page_from(first: usize, titles: &[&str], after: &str) -> String {
    let cards: String = titles
        .iter()
        .enumerate()
        .map(|(i, title)| card(first + i, title))
        .collect();
    format!(
        r#"<html><head><title>Businesses for Sale</title></head><body>
        <nav><a href="/">Home</a><a href="/about">About</a></nav>
        <section class="results">{}</section>
        {}
        <footer>Copyright Broker Co</footer>
        </body></html>"#,
        cards, after
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Creates a test configuration that stores into `dir` and never sleeps
fn create_test_config(dir: &Path, sources: Vec<Source>) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 2,
            page_delay_min_ms: 0,
            page_delay_max_ms: 0,
            politeness_min_ms: 0,
            politeness_max_ms: 0,
            ..Default::default()
        },
        http: HttpConfig {
            timeout_secs: 5,
            connect_timeout_secs: 2,
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_cap_ms: 10,
            ..Default::default()
        },
        output: OutputConfig {
            database_path: dir.join("sieve.db").to_string_lossy().into_owned(),
            summary_path: dir.join("summary.md").to_string_lossy().into_owned(),
        },
        vertical: VerticalFilter {
            slug: "cleaning".to_string(),
            name: "Cleaning Services".to_string(),
            include: vec![
                "cleaning".to_string(),
                "janitorial".to_string(),
                "maid".to_string(),
            ],
            exclude: vec!["restaurant".to_string()],
        },
        sources,
        ..Default::default()
    }
}

fn open_db(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).unwrap()
}

#[tokio::test]
async fn test_full_crawl_single_source() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/businesses"))
        .respond_with(html(listings_page(CLEANING_TITLES)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/businesses", mock_server.uri());
    let config = create_test_config(dir.path(), vec![Source::new("1042", "Acme Brokers", &url)]);

    let coordinator = Coordinator::new(config.clone(), "test-hash").unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.sources_succeeded, 1);
    assert_eq!(summary.listings, 5);
    assert_eq!(summary.with_price, 5);
    assert_eq!(summary.with_cash_flow, 5);
    assert_eq!(summary.patterns_learned, 1);

    let report = &summary.reports[0];
    assert_eq!(report.stop_reason, Some(StopReason::NoNextPage));
    assert!(report.pattern.is_some());

    let storage = open_db(&config);
    assert_eq!(storage.count_listings().unwrap(), 5);
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
}

#[tokio::test]
async fn test_pagination_stops_after_consecutive_empty_pages() {
    let mock_server = MockServer::start().await;

    // Every page repeats the same listings, so pages 2.. add nothing new
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(html(listings_page(CLEANING_TITLES)))
        .expect(4)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/listings?page=1", mock_server.uri());
    let config = create_test_config(dir.path(), vec![Source::new("7", "Repeater", &url)]);

    let summary = Coordinator::new(config, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.outcome, SourceOutcome::Succeeded);
    assert_eq!(report.listings, 5);
    assert_eq!(report.pages, 4);
    assert_eq!(report.stop_reason, Some(StopReason::ConsecutiveEmpty));
}

#[tokio::test]
async fn test_follows_next_link() {
    let mock_server = MockServer::start().await;

    let first = listings_page_from(
        1,
        &CLEANING_TITLES[..3],
        r#"<div class="pagination"><a class="next" href="/page-two">Next</a></div>"#,
    );
    let second = listings_page_from(
        4,
        &[
            CLEANING_TITLES[3],
            CLEANING_TITLES[4],
            "Office Janitorial Contracts Package",
        ],
        "",
    );

    Mock::given(method("GET"))
        .and(path("/page-one"))
        .respond_with(html(first))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page-two"))
        .respond_with(html(second))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/page-one", mock_server.uri());
    let config = create_test_config(dir.path(), vec![Source::new("8", "Two Pages", &url)]);

    let summary = Coordinator::new(config, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.pages, 2);
    assert_eq!(report.listings, 6);
    assert_eq!(report.stop_reason, Some(StopReason::NoNextPage));
}

#[tokio::test]
async fn test_blocked_source_is_classified_and_logged() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/listings", mock_server.uri());
    let config = create_test_config(dir.path(), vec![Source::new("9", "Fortress", &url)]);

    let summary = Coordinator::new(config.clone(), "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.sources_failed, 1);
    assert_eq!(
        summary.reports[0].outcome,
        SourceOutcome::Failed(FailureType::Blocked)
    );
    // A failed source does not fail the run
    assert_eq!(summary.status, RunStatus::Completed);

    let storage = open_db(&config);
    let failures = storage.failures_for_run(summary.run_id).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].failure_type, FailureType::Blocked);
    assert_eq!(failures[0].http_status, Some(403));
}

#[tokio::test]
async fn test_learned_pattern_survives_restart() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/businesses"))
        .respond_with(html(listings_page(CLEANING_TITLES)))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/businesses", mock_server.uri());
    let config = create_test_config(dir.path(), vec![Source::new("1", "Acme", &url)]);

    let first = Coordinator::new(config.clone(), "hash").unwrap();
    let summary = first.run().await.unwrap();
    assert_eq!(summary.patterns_learned, 1);
    let learned = summary.reports[0].pattern.clone().unwrap();
    drop(first);

    // A fresh coordinator reads the pattern back from the database
    let second = Coordinator::new(config.clone(), "hash").unwrap();
    assert_eq!(second.knowledge().stats().patterns, 1);

    let summary = second.run().await.unwrap();
    let report = &summary.reports[0];
    assert_eq!(report.outcome, SourceOutcome::Succeeded);
    assert_eq!(report.pattern.as_deref(), Some(learned.as_str()));
    assert!(!report.pattern_learned);

    // Listings are upserted, not duplicated
    let storage = open_db(&config);
    assert_eq!(storage.count_listings().unwrap(), 5);
    let patterns = storage.load_patterns().unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].success_count, 1);
}

#[tokio::test]
async fn test_vertical_filter_drops_other_industries() {
    let mock_server = MockServer::start().await;
    let titles: Vec<&str> = CLEANING_TITLES[..3]
        .iter()
        .chain(RESTAURANT_TITLES.iter())
        .copied()
        .collect();
    Mock::given(method("GET"))
        .and(path("/mixed"))
        .respond_with(html(listings_page(&titles)))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/mixed", mock_server.uri());
    let config = create_test_config(dir.path(), vec![Source::new("3", "Mixed", &url)]);

    let summary = Coordinator::new(config, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.listings, 3);
    assert_eq!(summary.filtered_out, 3);
}

#[tokio::test]
async fn test_csv_inventory_file() {
    let mock_server = MockServer::start().await;
    let page = r#"<html><body><h1>Our Inventory</h1>
        <p>Download the full list of businesses below.</p>
        <a href="/downloads/inventory.csv">Download inventory (CSV)</a>
        </body></html>"#;
    let csv = "Business Name,Asking Price,Location\n\
        Sparkle Janitorial,\"$240,000\",\"Tulsa, OK\"\n\
        Maid Brigade Territory,\"$95,000\",\"Austin, TX\"\n\
        Lake House 4 bed 3 bath,\"$510,000\",\"Austin, TX\"\n";

    Mock::given(method("GET"))
        .and(path("/inventory"))
        .respond_with(html(page.to_string()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/downloads/inventory.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(csv)
                .insert_header("content-type", "text/csv"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/inventory", mock_server.uri());
    let config = create_test_config(dir.path(), vec![Source::new("5", "Files", &url)]);

    let summary = Coordinator::new(config.clone(), "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.outcome, SourceOutcome::Succeeded);
    assert_eq!(report.stop_reason, Some(StopReason::TabularFile));
    assert_eq!(report.listings, 2);
    assert_eq!(open_db(&config).count_listings().unwrap(), 2);
}

#[tokio::test]
async fn test_crawl_from_config_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/businesses"))
        .respond_with(html(listings_page(CLEANING_TITLES)))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("sieve.db");
    let config_path = dir.path().join("sieve.toml");
    let toml = format!(
        r#"
[crawler]
workers = 2
page-delay-min-ms = 0
page-delay-max-ms = 0

[http]
max-attempts = 1

[output]
database-path = "{db}"
summary-path = "{summary}"

[vertical]
slug = "cleaning"
include = ["cleaning", "janitorial", "maid"]

[[source]]
id = "1"
name = "Acme"
url = "{base}/businesses"

[[source]]
id = "2"
name = "Gone"
url = "{base}/broken"
"#,
        db = db_path.display(),
        summary = dir.path().join("summary.md").display(),
        base = mock_server.uri()
    );
    let mut file = std::fs::File::create(&config_path).unwrap();
    file.write_all(toml.as_bytes()).unwrap();

    let (config, hash) = load_config_with_hash(&config_path).unwrap();
    assert_eq!(hash.len(), 64);

    let summary = crawl(config, hash).await.unwrap();
    assert_eq!(summary.sources_attempted, 2);
    assert_eq!(summary.sources_succeeded, 1);
    assert_eq!(summary.failures_by_type[&FailureType::NotFound], 1);
    assert_eq!(summary.reports[0].source_id, "1");
    assert_eq!(summary.reports[1].source_id, "2");
}
