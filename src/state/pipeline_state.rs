//! Pipeline phase definitions for a harvest run
//!
//! The phase is never stored on its own; it is derived from the completion
//! tracker's counters so that it cannot drift from them.

use std::fmt;

/// Represents the current phase of a harvest pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Run has not been started
    Idle,

    /// Listing pages are still being walked
    Discovering,

    /// Discovery finished; workers are finishing queued links
    Draining,

    /// Discovery finished, every worker exited and the link queue is empty
    Done,
}

impl PipelineState {
    /// Converts the phase to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Draining => "draining",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
