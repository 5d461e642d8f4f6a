//! Storage module for persisting crawl results
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Listing upserts keyed by content-addressed identifier
//! - Domain pattern records and the append-only pattern history
//! - The append-only failure log
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{
    FailureLog, ListingSink, PatternStore, RunLog, Storage, StorageError, StorageResult,
};

use crate::SieveError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SieveError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SieveError> {
    SqliteStorage::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub vertical: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

/// Which pattern worked for a domain, and how often
///
/// One record per domain. The signature is overwritten by the latest
/// success; counts accumulate.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainPatternRecord {
    pub domain: String,
    pub pattern_signature: String,
    pub success_count: u32,
    pub total_listings: u64,
    pub first_seen: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// One entry of the append-only pattern history
#[derive(Debug, Clone, PartialEq)]
pub struct PatternHistoryEntry {
    pub domain: String,
    pub pattern_signature: String,
    pub listings_count: u32,
    pub recorded_at: DateTime<Utc>,
}

/// A stored listing row
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub revenue: Option<f64>,
    pub cash_flow: Option<f64>,
    pub source_id: String,
    pub vertical: String,
    pub run_id: i64,
    pub first_seen_at: String,
    pub scraped_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
        // Runs end completed or interrupted, never "failed"
        assert_eq!(RunStatus::from_db_string("failed"), None);
    }
}
