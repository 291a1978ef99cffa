//! Caching middleware for read-only query handlers

use crate::cache::{cache_key, ResponseCache};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Arguments that contribute to a cache key
pub trait CacheArgs {
    /// Named argument values; `None` values are rendered as empty strings
    fn cache_args(&self) -> Vec<(&'static str, String)>;
}

/// A read-only query over stored bulletins
#[async_trait]
pub trait QueryHandler: Send + Sync {
    type Args: CacheArgs + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send + Sync;

    /// Stable handler name used in cache keys
    fn name(&self) -> &'static str;

    async fn handle(&self, args: Self::Args) -> crate::Result<Self::Output>;
}

/// A handler whose responses are served from the response cache
pub struct Cached<H> {
    inner: H,
    cache: ResponseCache,
    prefix: String,
}

/// Wraps a handler with response caching under the given key prefix
pub fn cached<H: QueryHandler>(handler: H, cache: ResponseCache, prefix: impl Into<String>) -> Cached<H> {
    Cached {
        inner: handler,
        cache,
        prefix: prefix.into(),
    }
}

impl<H> Cached<H> {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<H: QueryHandler> QueryHandler for Cached<H> {
    type Args = H::Args;
    type Output = H::Output;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn handle(&self, args: Self::Args) -> crate::Result<Self::Output> {
        let key = cache_key(&self.prefix, self.inner.name(), &args.cache_args());

        if let Some(hit) = self.cache.get_json::<H::Output>(&key).await {
            tracing::debug!("Cache hit for {}", key);
            return Ok(hit);
        }

        let output = self.inner.handle(args).await?;
        self.cache.set_json(&key, &output).await;
        Ok(output)
    }
}
