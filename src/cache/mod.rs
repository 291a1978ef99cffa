//! Response cache for the read-only query handlers
//!
//! Responses are stored as JSON in a [`CacheStore`] under deterministic keys
//! and expire at the next daily reset time. The cache is strictly
//! best-effort: a store failure is logged and treated as a miss.

mod handler;
mod reset;
mod store;

pub use handler::{cached, CacheArgs, Cached, QueryHandler};
pub use reset::{next_reset_after, parse_reset_time, ttl_until_reset, ResetScheduler};
pub use store::{glob_to_regex, CacheError, CacheStore, MemoryStore};

use chrono::{Local, NaiveDateTime, NaiveTime};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Builds a cache key from a prefix, a handler name and its arguments
///
/// Arguments are sorted by name so that call-site ordering does not matter.
/// The key is rendered `prefix:handler:hash`, which lets `prefix:*` address
/// one family of responses.
pub fn cache_key(prefix: &str, handler: &str, args: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = args.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    hasher.update(handler.as_bytes());
    hasher.update(prefix.as_bytes());
    for (name, value) in sorted {
        hasher.update(b"\x1f");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }

    format!("{}:{}:{}", prefix, handler, hex::encode(hasher.finalize()))
}

/// Snapshot of cache state
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub entries: usize,
    pub reset_time: String,
    pub next_reset: NaiveDateTime,
}

/// JSON response cache with a daily reset
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    reset: NaiveTime,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, reset: NaiveTime) -> Self {
        Self { store, reset }
    }

    /// Creates a cache over a fresh in-process store
    pub fn in_memory(reset: NaiveTime) -> Self {
        Self::new(Arc::new(MemoryStore::new()), reset)
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        Arc::clone(&self.store)
    }

    /// Starts the background task flushing this cache at the reset time
    pub fn spawn_reset_scheduler(&self) -> ResetScheduler {
        ResetScheduler::spawn(self.store(), self.reset)
    }

    /// Reads and decodes a cached value; any failure is a miss
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Encodes and stores a value until the next reset
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to encode cache entry {}: {}", key, e);
                return false;
            }
        };

        let ttl = ttl_until_reset(Local::now().naive_local(), self.reset);
        match self.store.set(key, raw, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Cache write failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Removes every entry matching a glob pattern
    pub async fn invalidate(&self, pattern: &str) -> usize {
        match self.store.delete_pattern(pattern).await {
            Ok(removed) => {
                tracing::info!("Invalidated {} cache entries matching {}", removed, pattern);
                removed
            }
            Err(e) => {
                tracing::warn!("Cache invalidation failed for {}: {}", pattern, e);
                0
            }
        }
    }

    /// Removes every entry
    pub async fn clear_all(&self) -> bool {
        match self.store.flush().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Cache flush failed: {}", e);
                false
            }
        }
    }

    pub async fn info(&self) -> CacheInfo {
        let entries = self.store.len().await.unwrap_or_else(|e| {
            tracing::warn!("Cache size unavailable: {}", e);
            0
        });

        CacheInfo {
            entries,
            reset_time: self.reset.format("%H:%M").to_string(),
            next_reset: next_reset_after(Local::now().naive_local(), self.reset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    fn reset() -> NaiveTime {
        NaiveTime::from_hms_opt(14, 11, 0).unwrap()
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = cache_key(
            "dynamics",
            "get_dynamics",
            &[("oil_id", "A592".to_string()), ("limit", "10".to_string())],
        );
        let b = cache_key(
            "dynamics",
            "get_dynamics",
            &[("limit", "10".to_string()), ("oil_id", "A592".to_string())],
        );
        assert_eq!(a, b);
        assert!(a.starts_with("dynamics:get_dynamics:"));
        assert_eq!(a.len(), "dynamics:get_dynamics:".len() + 64);
    }

    #[test]
    fn test_cache_key_distinguishes_values() {
        let a = cache_key("p", "h", &[("limit", "10".to_string())]);
        let b = cache_key("p", "h", &[("limit", "11".to_string())]);
        let c = cache_key("p", "other", &[("limit", "10".to_string())]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_json_roundtrip_and_clear() {
        let cache = ResponseCache::in_memory(reset());
        assert!(cache.set_json("k", &vec!["2025-01-05"]).await);

        let value: Option<Vec<String>> = cache.get_json("k").await;
        assert_eq!(value, Some(vec!["2025-01-05".to_string()]));

        assert!(cache.clear_all().await);
        assert_eq!(cache.get_json::<Vec<String>>("k").await, None);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_miss() {
        let cache = ResponseCache::in_memory(reset());
        cache
            .store()
            .set("k", "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get_json::<Vec<u32>>("k").await, None);
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn delete_pattern(&self, _pattern: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn flush(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn len(&self) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failures_degrade() {
        let cache = ResponseCache::new(Arc::new(BrokenStore), reset());

        assert_eq!(cache.get_json::<u32>("k").await, None);
        assert!(!cache.set_json("k", &1u32).await);
        assert_eq!(cache.invalidate("*").await, 0);
        assert!(!cache.clear_all().await);
        assert_eq!(cache.info().await.entries, 0);
    }

    #[tokio::test]
    async fn test_info_reports_reset() {
        let cache = ResponseCache::in_memory(reset());
        cache.set_json("a", &1u32).await;

        let info = cache.info().await;
        assert_eq!(info.entries, 1);
        assert_eq!(info.reset_time, "14:11");
        assert!(info.next_reset > Local::now().naive_local());
    }
}
