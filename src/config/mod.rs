//! Configuration module for Spimex-Harvest
//!
//! This module handles loading, environment expansion, parsing, and
//! validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use spimex_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Cutoff date: {}", config.crawler.cutoff_date);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CacheConfig, Config, CrawlerConfig, StorageConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, expand_env_vars, hash_content, load_config, load_config_with_hash,
    parse_config,
};
