//! Crawler module for report discovery, download and ingestion
//!
//! This module contains the core harvesting pipeline, including:
//! - HTTP fetching behind the `FetchClient` seam
//! - Listing page discovery with the date-window stopping rule
//! - The link queue and completion tracking
//! - Download workers, the record sink and overall coordination

mod coordinator;
mod discovery;
mod fetcher;
mod queue;
mod sink;
mod tracker;
mod worker;

pub use coordinator::{run_harvest, Coordinator, HarvestSummary};
pub use discovery::{
    normalize_report_url, scan_page, DiscoveryReport, LinkDiscoverer, ListingRules, PageScan,
    StopReason,
};
pub use fetcher::{build_http_client, FetchClient, FetchError, FetchResult, HttpFetcher};
pub use queue::{link_channel, LinkEntry, LinkReceiver, LinkSender, Received};
pub use sink::{RecordSink, SinkReport};
pub use tracker::{CompletionTracker, WorkerGuard};
pub use worker::{DownloadWorker, WorkerReport};

use crate::config::Config;
use crate::HarvestError;

/// Runs a complete harvest operation
///
/// This is the main entry point for a harvest pass. It will:
/// 1. Open the storage layer and read the stored high-water mark
/// 2. Record a new run
/// 3. Build the HTTP client
/// 4. Walk the listing and queue report links
/// 5. Download and extract reports concurrently
/// 6. Ingest the extracted records
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `config_hash` - Hash of the configuration file
///
/// # Returns
///
/// * `Ok(HarvestSummary)` - Harvest completed
/// * `Err(HarvestError)` - Harvest failed
pub async fn harvest(config: Config, config_hash: String) -> Result<HarvestSummary, HarvestError> {
    run_harvest(config, config_hash).await
}
