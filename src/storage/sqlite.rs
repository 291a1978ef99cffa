//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::extract::BulletinRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{BulletinFilter, RunRecord, RunStatus};
use crate::HarvestError;
use chrono::{NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

const BULLETIN_COLUMNS: &str = "exchange_product_id, exchange_product_name, oil_id, \
     delivery_basis_id, delivery_basis_name, delivery_type_id, volume, total, count, date";

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, links_found, records_ingested";

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
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Failed),
        links_found: row.get::<_, i64>(5)? as u64,
        records_ingested: row.get::<_, i64>(6)? as u64,
    })
}

fn bulletin_from_row(row: &Row<'_>) -> rusqlite::Result<BulletinRecord> {
    Ok(BulletinRecord {
        product_id: row.get(0)?,
        product_name: row.get(1)?,
        oil_category: row.get(2)?,
        delivery_basis_id: row.get(3)?,
        delivery_basis_name: row.get(4)?,
        delivery_type_id: row.get(5)?,
        volume: row.get(6)?,
        total: row.get(7)?,
        count: row.get(8)?,
        date: row.get(9)?,
    })
}

/// Builds the `AND ...` conditions for a filter, pushing bind values in order
fn filter_conditions(filter: &BulletinFilter, with_dates: bool, values: &mut Vec<Value>) -> String {
    let mut sql = String::new();

    let text_filters = [
        ("oil_id", &filter.oil_id),
        ("delivery_type_id", &filter.delivery_type_id),
        ("delivery_basis_id", &filter.delivery_basis_id),
    ];
    for (column, value) in text_filters {
        if let Some(value) = value {
            values.push(Value::Text(value.clone()));
            sql.push_str(&format!(" AND {} = ?{}", column, values.len()));
        }
    }

    if with_dates {
        if let Some(start) = filter.start_date {
            values.push(Value::Text(start.to_string()));
            sql.push_str(&format!(" AND date >= ?{}", values.len()));
        }
        if let Some(end) = filter.end_date {
            values.push(Value::Text(end.to_string()));
            sql.push_str(&format!(" AND date <= ?{}", values.len()));
        }
    }

    sql
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        let run = self
            .conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?;

        run.ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }

    fn complete_run(
        &mut self,
        run_id: i64,
        links_found: u64,
        records_ingested: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, links_found = ?3, records_ingested = ?4
             WHERE id = ?5",
            params![
                RunStatus::Completed.to_db_string(),
                now,
                links_found as i64,
                records_ingested as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn fail_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Failed.to_db_string(), now, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Bulletins =====

    fn max_known_date(&self) -> StorageResult<Option<NaiveDate>> {
        let date: Option<NaiveDate> =
            self.conn
                .query_row("SELECT MAX(date) FROM bulletins", [], |row| row.get(0))?;
        Ok(date)
    }

    fn ingest(&mut self, records: &[BulletinRecord]) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        if let Some(bad) = records
            .iter()
            .find(|r| r.volume < 0 || r.total < 0 || r.count < 0)
        {
            return Err(StorageError::ConstraintViolation(format!(
                "negative quantity for {} on {}",
                bad.product_id, bad.date
            )));
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO bulletins (exchange_product_id, exchange_product_name, oil_id,
                 delivery_basis_id, delivery_basis_name, delivery_type_id, volume, total, count,
                 date, created_on, updated_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(exchange_product_id, date) DO UPDATE SET
                    exchange_product_name = excluded.exchange_product_name,
                    oil_id = excluded.oil_id,
                    delivery_basis_id = excluded.delivery_basis_id,
                    delivery_basis_name = excluded.delivery_basis_name,
                    delivery_type_id = excluded.delivery_type_id,
                    volume = excluded.volume,
                    total = excluded.total,
                    count = excluded.count,
                    updated_on = excluded.updated_on",
            )?;

            for record in records {
                stmt.execute(params![
                    record.product_id,
                    record.product_name,
                    record.oil_category,
                    record.delivery_basis_id,
                    record.delivery_basis_name,
                    record.delivery_type_id,
                    record.volume,
                    record.total,
                    record.count,
                    record.date,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    // ===== Queries =====

    fn count_bulletins(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM bulletins", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_trading_days(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT date) FROM bulletins", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn date_range(&self) -> StorageResult<Option<(NaiveDate, NaiveDate)>> {
        let (min, max): (Option<NaiveDate>, Option<NaiveDate>) = self.conn.query_row(
            "SELECT MIN(date), MAX(date) FROM bulletins",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(min.zip(max))
    }

    fn latest_bulletins(
        &self,
        filter: &BulletinFilter,
        limit: usize,
    ) -> StorageResult<Vec<BulletinRecord>> {
        let mut values = Vec::new();
        let conditions = filter_conditions(filter, false, &mut values);
        values.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT {} FROM bulletins
             WHERE 1 = 1{}
             ORDER BY date DESC, exchange_product_id ASC
             LIMIT ?{}",
            BULLETIN_COLUMNS,
            conditions,
            values.len()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), bulletin_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn last_trading_dates(&self, limit: usize) -> StorageResult<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT date FROM bulletins ORDER BY date DESC LIMIT ?1")?;

        let dates = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<NaiveDate>, _>>()?;

        Ok(dates)
    }

    fn query_bulletins(
        &self,
        filter: &BulletinFilter,
        limit: usize,
    ) -> StorageResult<Vec<BulletinRecord>> {
        let mut values = Vec::new();
        let conditions = filter_conditions(filter, true, &mut values);
        values.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT {} FROM bulletins
             WHERE 1 = 1{}
             ORDER BY date DESC, exchange_product_id ASC
             LIMIT ?{}",
            BULLETIN_COLUMNS,
            conditions,
            values.len()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), bulletin_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

/// Initializes a database at the given path
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Successfully opened/created database
/// * `Err(rusqlite::Error)` - Failed to open database
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
