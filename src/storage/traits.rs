//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::extract::BulletinRecord;
use crate::storage::{BulletinFilter, RunRecord};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the harvester and
/// the query handlers. Callers share one backend behind a mutex.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as completed with its totals and a finish timestamp
    fn complete_run(
        &mut self,
        run_id: i64,
        links_found: u64,
        records_ingested: u64,
    ) -> StorageResult<()>;

    /// Marks a run as failed with a finish timestamp
    fn fail_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Bulletins =====

    /// Latest bulletin date already stored, if any
    fn max_known_date(&self) -> StorageResult<Option<NaiveDate>>;

    /// Stores a batch of records in one transaction
    ///
    /// Records are keyed by instrument code and date; re-ingesting a key
    /// overwrites it, so ingesting the same batch twice is a no-op in effect.
    ///
    /// # Returns
    ///
    /// The number of records written
    fn ingest(&mut self, records: &[BulletinRecord]) -> StorageResult<usize>;

    // ===== Queries =====

    /// Total number of stored bulletin rows
    fn count_bulletins(&self) -> StorageResult<u64>;

    /// Number of distinct stored dates
    fn count_trading_days(&self) -> StorageResult<u64>;

    /// Earliest and latest stored dates
    fn date_range(&self) -> StorageResult<Option<(NaiveDate, NaiveDate)>>;

    /// Most recent records matching the filter, newest date first
    ///
    /// Date bounds in the filter are ignored.
    fn latest_bulletins(
        &self,
        filter: &BulletinFilter,
        limit: usize,
    ) -> StorageResult<Vec<BulletinRecord>>;

    /// Most recent distinct dates, newest first
    fn last_trading_dates(&self, limit: usize) -> StorageResult<Vec<NaiveDate>>;

    /// Records matching the filter, newest date first
    fn query_bulletins(
        &self,
        filter: &BulletinFilter,
        limit: usize,
    ) -> StorageResult<Vec<BulletinRecord>>;
}
