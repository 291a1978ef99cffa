//! Spimex-Harvest: a bulletin crawler for exchange trading results
//!
//! This crate discovers dated report links on a paginated listing site,
//! downloads each report, extracts the metric-ton trading records and
//! persists them, with a small cached read layer on top of the stored data.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod query;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Spimex-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Extraction error: {0}")]
    Extract(#[from] extract::ExtractError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid query argument: {0}")]
    InvalidArgument(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Environment variables not set: {0}")]
    MissingEnv(String),
}

/// Result type alias for Spimex-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{harvest, Coordinator, HarvestSummary, LinkEntry};
pub use extract::{BulletinRecord, RecordBatch, RecordExtractor};
pub use state::{CrawlState, DateVerdict, PipelineState};
