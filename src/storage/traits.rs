//! Storage traits and error types
//!
//! The storage API is split by concern so that each collaborator only sees
//! what it writes: the knowledge base gets a [`PatternStore`], the
//! coordinator gets the whole [`Storage`].

use crate::extract::NormalizedListing;
use crate::state::{FailureRecord, FailureType};
use crate::storage::{
    DomainPatternRecord, ListingRecord, PatternHistoryEntry, RunRecord, RunStatus,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Run bookkeeping
pub trait RunLog {
    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    /// * `vertical` - Slug of the vertical filter in effect
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str, vertical: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;
}

/// Destination of accepted listings
pub trait ListingSink {
    /// Inserts a listing or updates the stored copy with the same identifier
    ///
    /// The first-seen timestamp of an existing listing is preserved.
    ///
    /// # Returns
    ///
    /// `true` if the listing was not stored before
    fn upsert_listing(&mut self, listing: &NormalizedListing) -> StorageResult<bool>;

    /// Gets a listing by identifier
    fn get_listing(&self, id: &str) -> StorageResult<Option<ListingRecord>>;

    /// Counts all stored listings
    fn count_listings(&self) -> StorageResult<u64>;

    /// Counts stored listings per source id, largest first
    fn count_listings_by_source(&self) -> StorageResult<Vec<(String, u64)>>;
}

/// Persistence behind the pattern knowledge base
pub trait PatternStore {
    /// Loads every domain pattern record
    fn load_patterns(&self) -> StorageResult<Vec<DomainPatternRecord>>;

    /// Inserts or replaces the record for `record.domain`
    fn upsert_pattern(&mut self, record: &DomainPatternRecord) -> StorageResult<()>;

    /// Appends to the pattern history
    fn append_history(&mut self, entry: &PatternHistoryEntry) -> StorageResult<()>;

    /// History entries for one domain, oldest first
    fn history_for_domain(&self, domain: &str) -> StorageResult<Vec<PatternHistoryEntry>>;
}

/// Append-only log of classified source failures
pub trait FailureLog {
    /// Appends a failure for a run
    fn record_failure(&mut self, run_id: i64, failure: &FailureRecord) -> StorageResult<()>;

    /// Failures recorded for one run, in insertion order
    fn failures_for_run(&self, run_id: i64) -> StorageResult<Vec<FailureRecord>>;

    /// Failure counts by type across all runs
    fn failure_breakdown(&self) -> StorageResult<HashMap<FailureType, u64>>;
}

/// Everything the coordinator needs from a backend
pub trait Storage: RunLog + ListingSink + PatternStore + FailureLog {}

impl<T: RunLog + ListingSink + PatternStore + FailureLog> Storage for T {}
