//! Record sink
//!
//! Single consumer of the records queue. Each batch is written to storage
//! in its own transaction on the blocking pool; a failed batch is logged
//! and counted, and the sink moves on.

use crate::crawler::CompletionTracker;
use crate::extract::RecordBatch;
use crate::storage::{SqliteStorage, Storage, StorageError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Sink counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub batches_ingested: usize,
    pub records_ingested: usize,
    pub empty_batches: usize,
    pub ingest_failures: usize,
}

/// Drains record batches into storage
pub struct RecordSink {
    storage: Arc<Mutex<SqliteStorage>>,
    records: UnboundedReceiver<RecordBatch>,
    tracker: Arc<CompletionTracker>,
    poll_timeout: Duration,
}

impl RecordSink {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        records: UnboundedReceiver<RecordBatch>,
        tracker: Arc<CompletionTracker>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            records,
            tracker,
            poll_timeout,
        }
    }

    /// Runs until the queue closes, or until the pipeline is complete and
    /// the queue is empty
    pub async fn run(mut self) -> SinkReport {
        let mut report = SinkReport::default();

        loop {
            match tokio::time::timeout(self.poll_timeout, self.records.recv()).await {
                Ok(Some(batch)) => self.ingest(batch, &mut report).await,
                Ok(None) => break,
                Err(_) => {
                    if self.tracker.is_complete() && self.records.is_empty() {
                        break;
                    }
                    tracing::debug!("Sink waiting, pipeline is {}", self.tracker.state());
                }
            }
        }

        tracing::info!(
            "Sink finished: {} batches, {} records, {} failures",
            report.batches_ingested,
            report.records_ingested,
            report.ingest_failures
        );
        report
    }

    async fn ingest(&self, batch: RecordBatch, report: &mut SinkReport) {
        if batch.is_empty() {
            tracing::info!("No records in {} ({})", batch.source_url, batch.date);
            report.empty_batches += 1;
            return;
        }

        let RecordBatch {
            source_url,
            date,
            records,
        } = batch;
        let storage = Arc::clone(&self.storage);
        let result = tokio::task::spawn_blocking(move || {
            let mut storage = storage
                .lock()
                .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))?;
            storage.ingest(&records)
        })
        .await;

        match result {
            Ok(Ok(written)) => {
                tracing::info!("Ingested {} records for {} from {}", written, date, source_url);
                report.batches_ingested += 1;
                report.records_ingested += written;
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to ingest batch from {}: {}", source_url, e);
                report.ingest_failures += 1;
            }
            Err(e) => {
                tracing::error!("Ingest task for {} aborted: {}", source_url, e);
                report.ingest_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BulletinRecord;
    use chrono::NaiveDate;
    use tokio::sync::mpsc;

    fn record(id: &str, volume: i64) -> BulletinRecord {
        BulletinRecord {
            product_id: id.to_string(),
            product_name: "Бензин".to_string(),
            oil_category: id[..4].to_string(),
            delivery_basis_id: id[4..7].to_string(),
            delivery_basis_name: "Борзя".to_string(),
            delivery_type_id: id[6..7].to_string(),
            volume,
            total: 10,
            count: 1,
            date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
        }
    }

    fn batch(records: Vec<BulletinRecord>) -> RecordBatch {
        RecordBatch::new(
            "https://example.com/r.xls",
            NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            records,
        )
    }

    #[tokio::test]
    async fn test_sink_drains_until_closed() {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let tracker = Arc::new(CompletionTracker::new());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(batch(vec![record("A592BO02A", 1), record("A592BO03A", 2)]))
            .unwrap();
        tx.send(batch(vec![])).unwrap();
        tx.send(batch(vec![record("A592BO04A", -1)])).unwrap();
        drop(tx);

        let sink = RecordSink::new(
            Arc::clone(&storage),
            rx,
            tracker,
            Duration::from_millis(20),
        );
        let report = sink.run().await;

        assert_eq!(report.batches_ingested, 1);
        assert_eq!(report.records_ingested, 2);
        assert_eq!(report.empty_batches, 1);
        assert_eq!(report.ingest_failures, 1);
        assert_eq!(storage.lock().unwrap().count_bulletins().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sink_counts_poisoned_storage_as_failure() {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let poisoner = Arc::clone(&storage);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(storage.is_poisoned());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(batch(vec![record("A592BO02A", 1)])).unwrap();
        tx.send(batch(vec![record("A592BO03A", 2)])).unwrap();
        drop(tx);

        let sink = RecordSink::new(
            storage,
            rx,
            Arc::new(CompletionTracker::new()),
            Duration::from_millis(20),
        );
        let report = sink.run().await;

        assert_eq!(report.ingest_failures, 2);
        assert_eq!(report.batches_ingested, 0);
    }

    #[tokio::test]
    async fn test_sink_exits_when_pipeline_complete() {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let tracker = Arc::new(CompletionTracker::new());
        let (tx, rx) = mpsc::unbounded_channel::<RecordBatch>();

        let sink = RecordSink::new(storage, rx, Arc::clone(&tracker), Duration::from_millis(20));
        let handle = tokio::spawn(sink.run());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished());

        tracker.mark_discovery_done();
        let report = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sink did not exit")
            .unwrap();
        assert_eq!(report, SinkReport::default());
        drop(tx);
    }
}
