//! Statistics from the bulletin database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::HarvestError;
use chrono::NaiveDate;
use serde::Serialize;

/// Harvest statistics summary
#[derive(Debug, Clone, Serialize)]
pub struct HarvestStatistics {
    /// Total number of stored bulletin rows
    pub total_bulletins: u64,

    /// Number of distinct trading dates
    pub trading_days: u64,

    /// Earliest and latest stored trading date
    pub date_range: Option<(NaiveDate, NaiveDate)>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl HarvestStatistics {
    /// Average number of rows per trading day
    pub fn rows_per_day(&self) -> f64 {
        if self.trading_days == 0 {
            0.0
        } else {
            self.total_bulletins as f64 / self.trading_days as f64
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    Ok(HarvestStatistics {
        total_bulletins: storage.count_bulletins()?,
        trading_days: storage.count_trading_days()?,
        date_range: storage.date_range()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Bulletin rows: {}", stats.total_bulletins);
    println!("  Trading days: {}", stats.trading_days);
    match stats.date_range {
        Some((first, last)) => println!("  Date range: {} .. {}", first, last),
        None => println!("  Date range: (empty)"),
    }
    println!("  Rows per day: {:.1}", stats.rows_per_day());
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  Id: {}", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Links found: {}", run.links_found);
            println!("  Records ingested: {}", run.records_ingested);
        }
        None => println!("No harvest runs recorded"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BulletinRecord;
    use crate::storage::{RunStatus, SqliteStorage};

    fn record(id: &str, day: u32) -> BulletinRecord {
        BulletinRecord {
            product_id: id.to_string(),
            product_name: "Бензин".to_string(),
            oil_category: id[..4].to_string(),
            delivery_basis_id: id[4..7].to_string(),
            delivery_basis_name: "Борзя".to_string(),
            delivery_type_id: id[6..7].to_string(),
            volume: 60,
            total: 100,
            count: 1,
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
        }
    }

    #[test]
    fn test_statistics_from_empty_storage() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();

        assert_eq!(stats.total_bulletins, 0);
        assert_eq!(stats.trading_days, 0);
        assert!(stats.date_range.is_none());
        assert!(stats.latest_run.is_none());
        assert_eq!(stats.rows_per_day(), 0.0);
    }

    #[test]
    fn test_statistics_after_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("abc").unwrap();
        storage
            .ingest(&[
                record("A592BO02A", 4),
                record("A592BO03A", 4),
                record("A592BO02A", 5),
            ])
            .unwrap();
        storage.complete_run(run_id, 2, 3).unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_bulletins, 3);
        assert_eq!(stats.trading_days, 2);
        assert_eq!(
            stats.date_range,
            Some((
                NaiveDate::from_ymd_opt(2025, 1, 4).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()
            ))
        );
        assert_eq!(stats.rows_per_day(), 1.5);

        let run = stats.latest_run.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.records_ingested, 3);
    }
}
