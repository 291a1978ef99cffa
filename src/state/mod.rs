//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `CrawlState`: the per-run date window and the stopping predicate
//! - `PipelineState`: the phase of a running pipeline (idle, discovering, draining, done)

mod crawl_state;
mod pipeline_state;

// Re-export main types
pub use crawl_state::{CrawlState, DateVerdict};
pub use pipeline_state::PipelineState;
