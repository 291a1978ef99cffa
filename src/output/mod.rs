//! Output module for reporting harvest results
//!
//! This module handles:
//! - Printing the summary of a finished harvest run
//! - Loading and displaying database statistics

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use crate::crawler::HarvestSummary;

/// Prints the summary of a finished run to stdout
pub fn print_summary(summary: &HarvestSummary) {
    println!("=== Harvest Run {} ===\n", summary.run_id);

    println!("Discovery:");
    println!("  Listing pages visited: {}", summary.pages_visited);
    println!("  Report links queued: {}", summary.links_queued);
    println!("  Stopped: {}", summary.stop_reason);
    println!();

    println!("Downloads:");
    println!("  Processed: {}", summary.links_processed);
    println!("  Not found: {}", summary.links_not_found);
    println!("  Failed: {}", summary.links_failed);
    println!();

    println!("Storage:");
    println!("  Batches ingested: {}", summary.batches_ingested);
    println!("  Records ingested: {}", summary.records_ingested);
    if summary.ingest_failures > 0 {
        println!("  Failed batches: {}", summary.ingest_failures);
    }
}
