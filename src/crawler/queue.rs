//! Link queue between the discoverer and the download workers
//!
//! One producer, many consumers. The tokio receiver is shared behind an
//! async mutex; every send and receive is mirrored in the tracker's
//! queued-link counter.

use crate::crawler::CompletionTracker;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// A report link accepted by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    /// Absolute report URL without query or fragment
    pub url: String,

    /// Bulletin date parsed from the link
    pub report_date: NaiveDate,
}

impl LinkEntry {
    pub fn new(url: impl Into<String>, report_date: NaiveDate) -> Self {
        Self {
            url: url.into(),
            report_date,
        }
    }
}

/// Result of waiting on the link queue
#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    Entry(LinkEntry),
    TimedOut,
    Closed,
}

/// Creates a link queue bound to a tracker
pub fn link_channel(tracker: Arc<CompletionTracker>) -> (LinkSender, LinkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LinkSender {
            tx,
            tracker: Arc::clone(&tracker),
        },
        LinkReceiver {
            rx: Arc::new(Mutex::new(rx)),
            tracker,
        },
    )
}

/// Producer half of the link queue
#[derive(Debug)]
pub struct LinkSender {
    tx: UnboundedSender<LinkEntry>,
    tracker: Arc<CompletionTracker>,
}

impl LinkSender {
    /// Enqueues a link; returns false if every receiver is gone
    pub fn send(&self, entry: LinkEntry) -> bool {
        self.tracker.link_enqueued();
        if self.tx.send(entry).is_err() {
            self.tracker.link_dequeued();
            return false;
        }
        true
    }
}

/// Shared consumer half of the link queue
#[derive(Debug, Clone)]
pub struct LinkReceiver {
    rx: Arc<Mutex<UnboundedReceiver<LinkEntry>>>,
    tracker: Arc<CompletionTracker>,
}

impl LinkReceiver {
    /// Waits up to `timeout` for the next link
    ///
    /// The timeout also covers waiting for other consumers to release the
    /// receiver.
    pub async fn recv_timeout(&self, timeout: Duration) -> Received {
        let next = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await;

        match next {
            Ok(Some(entry)) => {
                self.tracker.link_dequeued();
                Received::Entry(entry)
            }
            Ok(None) => Received::Closed,
            Err(_) => Received::TimedOut,
        }
    }

    /// True when no link is waiting
    pub fn is_empty(&self) -> bool {
        self.tracker.queued_links() == 0
    }
}
