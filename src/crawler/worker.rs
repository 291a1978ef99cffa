//! Download workers
//!
//! Each worker takes links off the shared queue, downloads the report,
//! runs extraction on the blocking pool and hands the batch to the sink.

use crate::crawler::{
    CompletionTracker, FetchClient, FetchResult, LinkEntry, LinkReceiver, Received, WorkerGuard,
};
use crate::extract::{RecordBatch, RecordExtractor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Per-worker counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: usize,
    pub failed: usize,
    pub not_found: usize,
    pub records: usize,
}

impl WorkerReport {
    pub fn merge(&mut self, other: &WorkerReport) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.not_found += other.not_found;
        self.records += other.records;
    }
}

/// A download worker
pub struct DownloadWorker {
    id: usize,
    fetcher: Arc<dyn FetchClient>,
    extractor: Arc<RecordExtractor>,
    links: LinkReceiver,
    records: UnboundedSender<RecordBatch>,
    tracker: Arc<CompletionTracker>,
    consumer_timeout: Duration,
}

impl DownloadWorker {
    pub fn new(
        id: usize,
        fetcher: Arc<dyn FetchClient>,
        extractor: Arc<RecordExtractor>,
        links: LinkReceiver,
        records: UnboundedSender<RecordBatch>,
        tracker: Arc<CompletionTracker>,
        consumer_timeout: Duration,
    ) -> Self {
        Self {
            id,
            fetcher,
            extractor,
            links,
            records,
            tracker,
            consumer_timeout,
        }
    }

    /// Processes links until the queue closes or discovery is done and the
    /// queue has drained
    ///
    /// The guard keeps this worker counted as active and is released when
    /// the future completes or unwinds.
    pub async fn run(self, _guard: WorkerGuard) -> WorkerReport {
        let mut report = WorkerReport::default();
        tracing::debug!("Worker {} started", self.id);

        loop {
            match self.links.recv_timeout(self.consumer_timeout).await {
                Received::Entry(entry) => self.process(entry, &mut report).await,
                Received::Closed => break,
                Received::TimedOut => {
                    if self.tracker.is_discovery_done() && self.links.is_empty() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(
            "Worker {} finished: {} processed, {} failed, {} not found",
            self.id,
            report.processed,
            report.failed,
            report.not_found
        );
        report
    }

    async fn process(&self, entry: LinkEntry, report: &mut WorkerReport) {
        tracing::info!("Worker {} downloading {}", self.id, entry.url);

        let body = match self.fetcher.fetch(&entry.url).await {
            Ok(FetchResult::Success { body, .. }) => body,
            Ok(FetchResult::NotFound) => {
                tracing::warn!("Report not found: {}", entry.url);
                report.not_found += 1;
                return;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!("Transient failure downloading {}: {}", e.url(), e);
                } else {
                    tracing::error!("Failed to download {}: {}", e.url(), e);
                }
                report.failed += 1;
                return;
            }
        };

        let extractor = Arc::clone(&self.extractor);
        let date = entry.report_date;
        let extracted =
            tokio::task::spawn_blocking(move || extractor.extract(&body, date)).await;

        let records = match extracted {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Extraction aborted for {}: {}", entry.url, e);
                report.failed += 1;
                return;
            }
        };

        report.processed += 1;
        report.records += records.len();

        let batch = RecordBatch::new(entry.url, date, records);
        if let Err(e) = self.records.send(batch) {
            tracing::error!("Record sink closed, dropping batch from {}", e.0.source_url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{link_channel, FetchError};
    use crate::extract::{Cell, ExtractError, TabularDecoder, METRIC_TON_UNIT};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tokio::sync::mpsc;

    /// Fetcher answering by URL suffix
    struct ScriptedFetcher;

    #[async_trait]
    impl FetchClient for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
            if url.ends_with("missing.xls") {
                Ok(FetchResult::NotFound)
            } else if url.ends_with("broken.xls") {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 500,
                })
            } else if url.ends_with("panic.xls") {
                Ok(FetchResult::Success {
                    final_url: url.to_string(),
                    status_code: 200,
                    body: b"PANIC".to_vec(),
                })
            } else {
                Ok(FetchResult::Success {
                    final_url: url.to_string(),
                    status_code: 200,
                    body: b"workbook".to_vec(),
                })
            }
        }
    }

    /// One-row sheet; panics on the magic body
    struct OneRowDecoder;

    impl TabularDecoder for OneRowDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ExtractError> {
            if bytes == b"PANIC" {
                panic!("decoder exploded");
            }
            let text = |s: &str| Cell::Text(s.to_string());
            Ok(vec![
                vec![Cell::Empty, text(METRIC_TON_UNIT)],
                vec![
                    Cell::Empty,
                    text("Код\nИнструмента"),
                    text("Наименование\nИнструмента"),
                    text("Базис\nпоставки"),
                    text("Объем\nДоговоров\nв единицах\nизмерения"),
                    text("Обьем\nДоговоров,\nруб."),
                    text("Количество\nДоговоров,\nшт."),
                ],
                vec![],
                vec![
                    Cell::Empty,
                    text("A592BO02A"),
                    text("Бензин"),
                    text("Борзя"),
                    Cell::Number(60.0),
                    Cell::Number(3_600_000.0),
                    Cell::Number(1.0),
                ],
            ])
        }
    }

    fn entry(name: &str) -> LinkEntry {
        LinkEntry::new(
            format!("https://example.com/{}", name),
            NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_worker_processes_and_classifies() {
        let tracker = Arc::new(CompletionTracker::new());
        let (links_tx, links_rx) = link_channel(Arc::clone(&tracker));
        let (records_tx, mut records_rx) = mpsc::unbounded_channel();

        for name in ["ok.xls", "missing.xls", "broken.xls", "panic.xls"] {
            links_tx.send(entry(name));
        }
        drop(links_tx);
        tracker.mark_discovery_done();

        let worker = DownloadWorker::new(
            0,
            Arc::new(ScriptedFetcher),
            Arc::new(RecordExtractor::new(OneRowDecoder)),
            links_rx,
            records_tx,
            Arc::clone(&tracker),
            Duration::from_millis(50),
        );
        let guard = tracker.register_worker();
        let report = tokio::spawn(worker.run(guard)).await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.records, 1);
        assert!(tracker.is_complete());

        let batch = records_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.source_url, "https://example.com/ok.xls");
        assert!(records_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_worker_exits_on_timeout_after_discovery() {
        let tracker = Arc::new(CompletionTracker::new());
        let (links_tx, links_rx) = link_channel(Arc::clone(&tracker));
        let (records_tx, _records_rx) = mpsc::unbounded_channel();

        let worker = DownloadWorker::new(
            1,
            Arc::new(ScriptedFetcher),
            Arc::new(RecordExtractor::new(OneRowDecoder)),
            links_rx,
            records_tx,
            Arc::clone(&tracker),
            Duration::from_millis(20),
        );
        let guard = tracker.register_worker();
        let handle = tokio::spawn(worker.run(guard));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished());

        // Sender still alive: only the discovery flag lets the worker go
        tracker.mark_discovery_done();
        let report = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not exit")
            .unwrap();

        assert_eq!(report, WorkerReport::default());
        assert_eq!(tracker.active_workers(), 0);
        drop(links_tx);
    }

    #[test]
    fn test_report_merge() {
        let mut total = WorkerReport::default();
        total.merge(&WorkerReport {
            processed: 2,
            failed: 1,
            not_found: 0,
            records: 10,
        });
        total.merge(&WorkerReport {
            processed: 1,
            failed: 0,
            not_found: 1,
            records: 5,
        });
        assert_eq!(total.processed, 3);
        assert_eq!(total.records, 15);
        assert_eq!(total.not_found, 1);
    }
}
