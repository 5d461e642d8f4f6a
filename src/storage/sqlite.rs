//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::extract::NormalizedListing;
use crate::state::{FailureRecord, FailureType};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    FailureLog, ListingSink, PatternStore, RunLog, StorageError, StorageResult,
};
use crate::storage::{
    DomainPatternRecord, ListingRecord, PatternHistoryEntry, RunRecord, RunStatus,
};
use crate::SieveError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SieveError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SieveError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SieveError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("Bad timestamp '{}': {}", value, e)))
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        vertical: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl RunLog for SqliteStorage {
    fn create_run(&mut self, config_hash: &str, vertical: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, vertical, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, config_hash, vertical, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, vertical, status FROM runs WHERE id = ?1",
                params![run_id],
                row_to_run,
            )
            .map_err(|_| StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, vertical, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }
}

impl ListingSink for SqliteStorage {
    fn upsert_listing(&mut self, listing: &NormalizedListing) -> StorageResult<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM listings WHERE id = ?1",
                params![listing.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let fields = &listing.listing;
        let scraped_at = listing.scraped_at.to_rfc3339();

        self.conn.execute(
            "INSERT INTO listings (
                id, title, url, price_raw, price, location, city, state, business_type,
                revenue, cash_flow, snippet, source_id, source_name, vertical, run_id,
                first_seen_at, scraped_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                price_raw = excluded.price_raw,
                price = excluded.price,
                location = excluded.location,
                city = excluded.city,
                state = excluded.state,
                business_type = excluded.business_type,
                revenue = excluded.revenue,
                cash_flow = excluded.cash_flow,
                snippet = excluded.snippet,
                source_id = excluded.source_id,
                source_name = excluded.source_name,
                vertical = excluded.vertical,
                run_id = excluded.run_id,
                scraped_at = excluded.scraped_at",
            params![
                listing.id,
                fields.title,
                fields.url,
                fields.price_raw,
                fields.price,
                fields.location,
                fields.city,
                fields.state,
                fields.business_type,
                fields.revenue,
                fields.cash_flow,
                fields.snippet,
                listing.source_id,
                listing.source_name,
                listing.vertical,
                listing.run_id,
                scraped_at,
            ],
        )?;

        Ok(!exists)
    }

    fn get_listing(&self, id: &str) -> StorageResult<Option<ListingRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, title, url, price, location, revenue, cash_flow, source_id, vertical,
                 run_id, first_seen_at, scraped_at
                 FROM listings WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ListingRecord {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        url: row.get(2)?,
                        price: row.get(3)?,
                        location: row.get(4)?,
                        revenue: row.get(5)?,
                        cash_flow: row.get(6)?,
                        source_id: row.get(7)?,
                        vertical: row.get(8)?,
                        run_id: row.get(9)?,
                        first_seen_at: row.get(10)?,
                        scraped_at: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn count_listings(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_listings_by_source(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, COUNT(*) AS n FROM listings
             GROUP BY source_id ORDER BY n DESC, source_id ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

impl PatternStore for SqliteStorage {
    fn load_patterns(&self) -> StorageResult<Vec<DomainPatternRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, pattern_signature, success_count, total_listings, first_seen, last_used
             FROM domain_patterns ORDER BY domain",
        )?;

        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(
                |(domain, pattern_signature, success_count, total, first_seen, last_used)| {
                    Ok(DomainPatternRecord {
                        domain,
                        pattern_signature,
                        success_count,
                        total_listings: total as u64,
                        first_seen: parse_timestamp(&first_seen)?,
                        last_used: parse_timestamp(&last_used)?,
                    })
                },
            )
            .collect()
    }

    fn upsert_pattern(&mut self, record: &DomainPatternRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO domain_patterns
                (domain, pattern_signature, success_count, total_listings, first_seen, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(domain) DO UPDATE SET
                pattern_signature = excluded.pattern_signature,
                success_count = excluded.success_count,
                total_listings = excluded.total_listings,
                last_used = excluded.last_used",
            params![
                record.domain,
                record.pattern_signature,
                record.success_count,
                record.total_listings as i64,
                record.first_seen.to_rfc3339(),
                record.last_used.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn append_history(&mut self, entry: &PatternHistoryEntry) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO pattern_history (domain, pattern_signature, listings_count, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.domain,
                entry.pattern_signature,
                entry.listings_count,
                entry.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn history_for_domain(&self, domain: &str) -> StorageResult<Vec<PatternHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, pattern_signature, listings_count, recorded_at
             FROM pattern_history WHERE domain = ?1 ORDER BY id",
        )?;

        let raw = stmt
            .query_map(params![domain], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(domain, pattern_signature, listings_count, recorded_at)| {
                Ok(PatternHistoryEntry {
                    domain,
                    pattern_signature,
                    listings_count,
                    recorded_at: parse_timestamp(&recorded_at)?,
                })
            })
            .collect()
    }
}

impl FailureLog for SqliteStorage {
    fn record_failure(&mut self, run_id: i64, failure: &FailureRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO failures
                (run_id, source_id, source_name, url, failure_type, detail, http_status, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                failure.source_id,
                failure.source_name,
                failure.url,
                failure.failure_type.to_db_string(),
                failure.detail,
                failure.http_status,
                failure.failed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn failures_for_run(&self, run_id: i64) -> StorageResult<Vec<FailureRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, source_name, url, failure_type, detail, http_status, failed_at
             FROM failures WHERE run_id = ?1 ORDER BY id",
        )?;

        let raw = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<u16>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(
                |(source_id, source_name, url, failure_type, detail, http_status, failed_at)| {
                    Ok(FailureRecord {
                        source_id,
                        source_name,
                        url,
                        failure_type: FailureType::from_db_string(&failure_type)
                            .unwrap_or(FailureType::Unknown),
                        detail,
                        http_status,
                        failed_at: parse_timestamp(&failed_at)?,
                    })
                },
            )
            .collect()
    }

    fn failure_breakdown(&self) -> StorageResult<HashMap<FailureType, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT failure_type, COUNT(*) FROM failures GROUP BY failure_type")?;

        let mut breakdown = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (failure_type, count) = row?;
            let failure_type =
                FailureType::from_db_string(&failure_type).unwrap_or(FailureType::Unknown);
            *breakdown.entry(failure_type).or_insert(0) += count as u64;
        }

        Ok(breakdown)
    }
}
