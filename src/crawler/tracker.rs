//! Completion tracking for the harvest pipeline
//!
//! The pipeline is finished once discovery has stopped, every worker has
//! exited and no link is waiting in the queue. Counters are plain atomics;
//! a [`Notify`] wakes waiters whenever one of them changes.

use crate::state::PipelineState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared counters deciding when the pipeline has drained
#[derive(Debug, Default)]
pub struct CompletionTracker {
    started: AtomicBool,
    discovery_done: AtomicBool,
    active_workers: AtomicUsize,
    queued_links: AtomicUsize,
    notify: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the pipeline as started
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Records that the discoverer will enqueue nothing more
    pub fn mark_discovery_done(&self) {
        self.started.store(true, Ordering::SeqCst);
        self.discovery_done.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Registers a worker; the count drops again when the guard is dropped
    ///
    /// Call this before spawning the worker task so that a worker that has
    /// not been polled yet still holds the pipeline open.
    pub fn register_worker(self: &Arc<Self>) -> WorkerGuard {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        WorkerGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn link_enqueued(&self) {
        self.queued_links.fetch_add(1, Ordering::SeqCst);
    }

    pub fn link_dequeued(&self) {
        // Saturate at zero
        let _ = self
            .queued_links
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.notify.notify_waiters();
    }

    pub fn is_discovery_done(&self) -> bool {
        self.discovery_done.load(Ordering::SeqCst)
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn queued_links(&self) -> usize {
        self.queued_links.load(Ordering::SeqCst)
    }

    /// Discovery finished, no worker active and no link queued
    pub fn is_complete(&self) -> bool {
        self.is_discovery_done() && self.active_workers() == 0 && self.queued_links() == 0
    }

    /// Current pipeline phase derived from the counters
    pub fn state(&self) -> PipelineState {
        if self.is_complete() {
            PipelineState::Done
        } else if self.is_discovery_done() {
            PipelineState::Draining
        } else if self.started.load(Ordering::SeqCst) {
            PipelineState::Discovering
        } else {
            PipelineState::Idle
        }
    }

    /// Waits until [`is_complete`](Self::is_complete) holds
    pub async fn wait_for_completion(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_complete() {
                return;
            }

            notified.await;
        }
    }
}

/// Keeps a worker counted as active until dropped
#[derive(Debug)]
pub struct WorkerGuard {
    tracker: Arc<CompletionTracker>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.tracker.active_workers.fetch_sub(1, Ordering::SeqCst);
        self.tracker.notify.notify_waiters();
    }
}
