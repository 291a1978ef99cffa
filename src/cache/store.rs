//! Key-value stores backing the response cache

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Errors reported by a cache store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid key pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

/// A string key-value store with per-entry expiry
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for a key
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores a value that expires after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Removes a key, returning whether it was present
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every key matching a glob pattern (`*` and `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError>;

    /// Removes every key
    async fn flush(&self) -> Result<(), CacheError>;

    /// Number of live entries
    async fn len(&self) -> Result<usize, CacheError>;
}

/// Compiles a glob into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| CacheError::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process cache store
///
/// Expired entries are invisible to reads and dropped lazily on write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !matcher.is_match(key));
        Ok(before - entries.len())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries.values().filter(|entry| entry.is_live(now)).count())
    }
}
