//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the broker-sieve database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    vertical TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Accepted listings, one row per content-addressed identifier
CREATE TABLE IF NOT EXISTS listings (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT,
    price_raw TEXT,
    price REAL,
    location TEXT,
    city TEXT,
    state TEXT,
    business_type TEXT,
    revenue REAL,
    cash_flow REAL,
    snippet TEXT NOT NULL,
    source_id TEXT NOT NULL,
    source_name TEXT NOT NULL,
    vertical TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    first_seen_at TEXT NOT NULL,
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_listings_source ON listings(source_id);
CREATE INDEX IF NOT EXISTS idx_listings_vertical ON listings(vertical);

-- Winning pattern per domain
CREATE TABLE IF NOT EXISTS domain_patterns (
    domain TEXT PRIMARY KEY,
    pattern_signature TEXT NOT NULL,
    success_count INTEGER NOT NULL,
    total_listings INTEGER NOT NULL,
    first_seen TEXT NOT NULL,
    last_used TEXT NOT NULL
);

-- Every recorded success, append-only
CREATE TABLE IF NOT EXISTS pattern_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    pattern_signature TEXT NOT NULL,
    listings_count INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pattern_history_domain ON pattern_history(domain);

-- Classified source failures, append-only
CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    source_id TEXT NOT NULL,
    source_name TEXT NOT NULL,
    url TEXT NOT NULL,
    failure_type TEXT NOT NULL,
    detail TEXT NOT NULL,
    http_status INTEGER,
    failed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failures_run ON failures(run_id);
CREATE INDEX IF NOT EXISTS idx_failures_type ON failures(failure_type);
"#;

/// Initializes the database schema
///
/// Every statement is `IF NOT EXISTS`, so this is safe to run on an existing
/// database.
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
