//! Daily cache reset
//!
//! Every cached response lives until the next occurrence of the configured
//! wall-clock reset time. A background task flushes the store at that
//! moment in case entries were written with a stale TTL.

use crate::cache::CacheStore;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay before retrying a failed flush
const RETRY_DELAY: Duration = Duration::from_secs(60);

/// Parses an `HH:MM` reset time
pub fn parse_reset_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
}

/// Next reset moment strictly after `now`
pub fn next_reset_after(now: NaiveDateTime, reset: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(reset);
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Time left until the next reset, never shorter than one second
pub fn ttl_until_reset(now: NaiveDateTime, reset: NaiveTime) -> Duration {
    let wait = next_reset_after(now, reset) - now;
    wait.to_std()
        .unwrap_or(Duration::ZERO)
        .max(Duration::from_secs(1))
}

/// Background task flushing a cache store once a day
pub struct ResetScheduler {
    handle: JoinHandle<()>,
}

impl ResetScheduler {
    /// Spawns the reset loop on the current runtime
    pub fn spawn(store: Arc<dyn CacheStore>, reset: NaiveTime) -> Self {
        Self::spawn_with_clock(store, reset, || Local::now().naive_local())
    }

    /// Spawns the reset loop reading wall-clock time from `clock`
    pub fn spawn_with_clock<C>(store: Arc<dyn CacheStore>, reset: NaiveTime, clock: C) -> Self
    where
        C: Fn() -> NaiveDateTime + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                let wait = ttl_until_reset(clock(), reset);
                tracing::debug!("Next cache reset in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;

                loop {
                    match store.flush().await {
                        Ok(()) => {
                            tracing::info!("Cache flushed at scheduled reset {}", reset);
                            break;
                        }
                        Err(e) => {
                            tracing::error!("Scheduled cache flush failed: {}", e);
                            tokio::time::sleep(RETRY_DELAY).await;
                        }
                    }
                }
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the reset loop
    pub fn shutdown(self) {
        self.handle.abort();
        tracing::debug!("Cache reset scheduler stopped");
    }
}
