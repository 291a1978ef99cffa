//! Harvest coordinator - main pipeline orchestration logic
//!
//! This module wires the pipeline together:
//! - Reading the stored high-water mark and building the crawl window
//! - Recording the run
//! - Spawning the discoverer, the download workers and the sink
//! - Finalising the run from the task outcomes

use crate::config::Config;
use crate::crawler::discovery::{DiscoveryReport, LinkDiscoverer, StopReason};
use crate::crawler::sink::{RecordSink, SinkReport};
use crate::crawler::worker::{DownloadWorker, WorkerReport};
use crate::crawler::{link_channel, CompletionTracker, FetchClient, HttpFetcher};
use crate::extract::RecordExtractor;
use crate::state::CrawlState;
use crate::storage::{SqliteStorage, Storage, StorageError};
use crate::{HarvestError, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Totals of one harvest run
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub run_id: i64,
    pub pages_visited: u32,
    pub links_queued: usize,
    pub stop_reason: String,
    pub links_processed: usize,
    pub links_failed: usize,
    pub links_not_found: usize,
    pub batches_ingested: usize,
    pub records_ingested: usize,
    pub ingest_failures: usize,
}

impl HarvestSummary {
    fn from_reports(
        run_id: i64,
        discovery: &DiscoveryReport,
        workers: &WorkerReport,
        sink: &SinkReport,
    ) -> Self {
        Self {
            run_id,
            pages_visited: discovery.pages_visited,
            links_queued: discovery.links_queued,
            stop_reason: discovery.stop_reason.to_string(),
            links_processed: workers.processed,
            links_failed: workers.failed,
            links_not_found: workers.not_found,
            batches_ingested: sink.batches_ingested,
            records_ingested: sink.records_ingested,
            ingest_failures: sink.ingest_failures,
        }
    }
}

/// Main harvest coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<dyn FetchClient>,
    extractor: Arc<RecordExtractor>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `config_hash` - Hash of the configuration file, recorded on the run
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - Failed to open storage or build the HTTP client
    pub fn new(config: Config, config_hash: impl Into<String>) -> Result<Self> {
        let storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
        let fetcher = HttpFetcher::from_config(&config.user_agent, config.crawler.request_timeout())?;

        Ok(Self::with_components(
            config,
            config_hash,
            storage,
            Arc::new(fetcher),
            RecordExtractor::default(),
        ))
    }

    /// Creates a coordinator over explicit components
    pub fn with_components(
        config: Config,
        config_hash: impl Into<String>,
        storage: SqliteStorage,
        fetcher: Arc<dyn FetchClient>,
        extractor: RecordExtractor,
    ) -> Self {
        Self {
            config: Arc::new(config),
            config_hash: config_hash.into(),
            storage: Arc::new(Mutex::new(storage)),
            fetcher,
            extractor: Arc::new(extractor),
        }
    }

    /// Shared handle to the storage backend
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    fn lock_storage(&self) -> std::result::Result<MutexGuard<'_, SqliteStorage>, StorageError> {
        self.storage
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
    }

    /// Runs one complete harvest pass
    ///
    /// The run row is finalised as completed or failed whatever the
    /// pipeline tasks did.
    pub async fn run(&self) -> Result<HarvestSummary> {
        let (max_known, run_id) = {
            let mut storage = self.lock_storage()?;
            let max_known = storage.max_known_date()?;
            let run_id = storage.create_run(&self.config_hash)?;
            (max_known, run_id)
        };

        let state = CrawlState::new(self.config.crawler.cutoff_date, max_known);
        tracing::info!(
            "Starting harvest run {} for window {}",
            run_id,
            state.describe_window()
        );

        let outcome = self.run_pipeline(run_id, state).await;

        let finalised = {
            let mut storage = self.lock_storage()?;
            match &outcome {
                Ok(summary) => storage.complete_run(
                    run_id,
                    summary.links_queued as u64,
                    summary.records_ingested as u64,
                ),
                Err(_) => storage.fail_run(run_id),
            }
        };

        if let Err(e) = finalised {
            tracing::error!("Failed to finalise run {}: {}", run_id, e);
        }

        match &outcome {
            Ok(summary) => tracing::info!(
                "Run {} completed: {} links, {} records",
                run_id,
                summary.links_queued,
                summary.records_ingested
            ),
            Err(e) => tracing::error!("Run {} failed: {}", run_id, e),
        }

        outcome
    }

    async fn run_pipeline(&self, run_id: i64, state: CrawlState) -> Result<HarvestSummary> {
        let crawler = &self.config.crawler;
        let tracker = Arc::new(CompletionTracker::new());
        let (links_tx, links_rx) = link_channel(Arc::clone(&tracker));
        let (records_tx, records_rx) = mpsc::unbounded_channel();

        let discoverer = LinkDiscoverer::from_config(Arc::clone(&self.fetcher), crawler)?;
        let discovery = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { discoverer.discover(state, links_tx, tracker).await })
        };

        let mut workers = Vec::with_capacity(crawler.workers);
        for id in 0..crawler.workers {
            let worker = DownloadWorker::new(
                id,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.extractor),
                links_rx.clone(),
                records_tx.clone(),
                Arc::clone(&tracker),
                crawler.consumer_timeout(),
            );
            let guard = tracker.register_worker();
            workers.push(tokio::spawn(worker.run(guard)));
        }
        drop(links_rx);
        drop(records_tx);

        let sink = RecordSink::new(
            Arc::clone(&self.storage),
            records_rx,
            Arc::clone(&tracker),
            crawler.consumer_timeout(),
        );
        let sink = tokio::spawn(sink.run());

        // Join everything before looking at failures
        let discovery = discovery.await;
        let mut worker_totals = WorkerReport::default();
        let mut worker_failure: Option<HarvestError> = None;
        for handle in workers {
            match handle.await {
                Ok(report) => worker_totals.merge(&report),
                Err(e) => {
                    tracing::error!("Worker task failed: {}", e);
                    if worker_failure.is_none() {
                        worker_failure = Some(HarvestError::Join(e));
                    }
                }
            }
        }
        let sink = sink.await;

        let discovery = discovery.map_err(|e| {
            tracing::error!("Discovery task failed: {}", e);
            HarvestError::Join(e)
        })?;
        if let Some(e) = worker_failure {
            return Err(e);
        }
        let sink = sink.map_err(|e| {
            tracing::error!("Sink task failed: {}", e);
            HarvestError::Join(e)
        })?;

        if discovery.stop_reason == StopReason::FetchFailed && discovery.pages_visited == 0 {
            tracing::warn!("First listing page could not be fetched; nothing was harvested");
        }

        Ok(HarvestSummary::from_reports(
            run_id,
            &discovery,
            &worker_totals,
            &sink,
        ))
    }
}

/// Runs a complete harvest using the configured storage and HTTP client
///
/// # Example
///
/// ```no_run
/// # use spimex_harvest::config::load_config_with_hash;
/// # use spimex_harvest::crawler::run_harvest;
/// # use std::path::Path;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let summary = run_harvest(config, hash).await?;
/// println!("{} records", summary.records_ingested);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: Config, config_hash: String) -> Result<HarvestSummary> {
    let coordinator = Coordinator::new(config, config_hash)?;
    coordinator.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::crawler::{FetchError, FetchResult};
    use crate::extract::{Cell, ExtractError, TabularDecoder};
    use crate::storage::RunStatus;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn config() -> Config {
        parse_config(
            r#"
[crawler]
base-url = "https://listing.test/results/"
cutoff-date = "2025-01-01"
workers = 2
consumer-timeout = 100
request-delay = 0

[user-agent]
crawler-name = "TestHarvest"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[storage]
database-path = ":memory:"
"#,
        )
        .unwrap()
    }

    struct DownFetcher;

    #[async_trait]
    impl FetchClient for DownFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<FetchResult, FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    /// One listing page; every other URL is missing
    struct ListingFetcher {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FetchClient for ListingFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<FetchResult, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            if url != "https://listing.test/results/?page=page-1" {
                return Ok(FetchResult::NotFound);
            }

            let anchors: String = ["20250105", "20250104", "20250103"]
                .iter()
                .map(|d| {
                    format!(
                        r#"<a class="accordeon-inner__item-title link xls" href="/upload/reports/oil_xls/oil_xls_{}162000.xls">r</a>"#,
                        d
                    )
                })
                .collect();
            Ok(FetchResult::Success {
                final_url: url.to_string(),
                status_code: 200,
                body: format!("<html><body>{}</body></html>", anchors).into_bytes(),
            })
        }
    }

    struct NoRows;

    impl TabularDecoder for NoRows {
        fn decode(&self, _bytes: &[u8]) -> std::result::Result<Vec<Vec<Cell>>, ExtractError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_unreachable_listing_completes_empty_run() {
        let coordinator = Coordinator::with_components(
            config(),
            "hash",
            SqliteStorage::new_in_memory().unwrap(),
            Arc::new(DownFetcher),
            RecordExtractor::new(NoRows),
        );

        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.pages_visited, 0);
        assert_eq!(summary.links_queued, 0);
        assert_eq!(summary.stop_reason, "fetch_failed");

        let storage = coordinator.storage();
        let storage = storage.lock().unwrap();
        let run = storage.get_run(summary.run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.config_hash, "hash");
    }

    #[tokio::test]
    async fn test_window_uses_stored_high_water_mark() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .ingest(&[crate::extract::BulletinRecord {
                product_id: "A592BO02A".to_string(),
                product_name: "Бензин".to_string(),
                oil_category: "A592".to_string(),
                delivery_basis_id: "BO0".to_string(),
                delivery_basis_name: "Борзя".to_string(),
                delivery_type_id: "0".to_string(),
                volume: 1,
                total: 1,
                count: 1,
                date: NaiveDate::from_ymd_opt(2025, 1, 4).unwrap(),
            }])
            .unwrap();

        let fetcher = Arc::new(ListingFetcher {
            requested: Mutex::new(Vec::new()),
        });
        let coordinator = Coordinator::with_components(
            config(),
            "hash",
            storage,
            fetcher.clone(),
            RecordExtractor::new(NoRows),
        );
        let summary = coordinator.run().await.unwrap();

        // 2025-01-04 is already stored, so only the newer report is queued
        assert_eq!(summary.pages_visited, 1);
        assert_eq!(summary.links_queued, 1);
        assert_eq!(summary.stop_reason, "date_boundary");
        assert_eq!(summary.links_not_found, 1);

        let requested = fetcher.requested.lock().unwrap();
        assert_eq!(requested.len(), 2);
        assert!(requested[1].ends_with("oil_xls_20250105162000.xls"));
    }
}
