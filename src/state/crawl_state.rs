//! Crawl window state and the date-boundary stopping rule
//!
//! A crawl run accepts report dates inside a window whose lower bound is
//! either the static cutoff date or, once the sink has stored something,
//! the high-water mark of previously stored dates.

use chrono::NaiveDate;
use std::fmt;

/// Outcome of checking a report date against the crawl window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateVerdict {
    /// Date lies inside the window and the link should be queued
    Accept,

    /// Date lies after today; never queued and ends discovery
    Future,

    /// Date lies at or below the lower bound; the listing is date-descending
    /// so nothing after this link is relevant
    TooOld,
}

impl DateVerdict {
    /// Returns true if the date was accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Returns true if this verdict halts discovery
    ///
    /// Every rejected date is a boundary.
    pub fn is_boundary(&self) -> bool {
        !self.is_accepted()
    }
}

impl fmt::Display for DateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accept => "accept",
            Self::Future => "future",
            Self::TooOld => "too_old",
        };
        write!(f, "{}", s)
    }
}

/// Per-run crawl window
///
/// Constructed once before a crawl run. The bounds are read-only for the
/// duration of discovery; only the page counter advances.
#[derive(Debug, Clone)]
pub struct CrawlState {
    /// Static lower bound used when nothing has been stored yet
    pub cutoff_date: NaiveDate,

    /// Most recent date already persisted by the sink
    pub max_known_date: Option<NaiveDate>,

    /// Listing page currently being processed (1-based)
    pub current_page: u32,
}

impl CrawlState {
    /// Creates a new crawl state starting at page 1
    pub fn new(cutoff_date: NaiveDate, max_known_date: Option<NaiveDate>) -> Self {
        Self {
            cutoff_date,
            max_known_date,
            current_page: 1,
        }
    }

    /// Classifies a report date against the window for an explicit `today`
    ///
    /// - dates after `today` are [`DateVerdict::Future`]
    /// - without a high-water mark: accepted iff `cutoff_date <= date`
    /// - with a high-water mark: accepted iff `max_known_date < date`
    pub fn verdict_on(&self, report_date: NaiveDate, today: NaiveDate) -> DateVerdict {
        if report_date > today {
            return DateVerdict::Future;
        }

        let in_window = match self.max_known_date {
            None => report_date >= self.cutoff_date,
            Some(max_known) => report_date > max_known,
        };

        if in_window {
            DateVerdict::Accept
        } else {
            DateVerdict::TooOld
        }
    }

    /// Returns the effective lower bound description for logging
    pub fn describe_window(&self) -> String {
        match self.max_known_date {
            Some(max_known) => format!("({}, today]", max_known),
            None => format!("[{}, today]", self.cutoff_date),
        }
    }

    /// Advances to the next listing page
    pub fn advance_page(&mut self) {
        self.current_page += 1;
    }
}
