//! Observable merge events
//!
//! Events are explicit and typed.

use std::fmt;

/// Observable events emitted while merging scan results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Merge configuration loaded
    ConfigLoaded,

    // Orchestration
    /// Merge requested for a query
    MergeStart,
    /// Strategy chosen for a query
    StrategySelected,
    /// Query rejected before any output
    QueryRejected,
    /// Query filter rewritten to its optimized form
    FilterOptimized,

    // Iteration
    /// Row quota met, upstream released early
    LimitReached,
    /// Bounded ordered merge drained its input
    OrderedMergeComplete,

    // Resources
    /// Underlying sequence released
    SequenceClosed,
    /// Releasing a sequence failed
    CloseFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::MergeStart => "MERGE_START",
            Event::StrategySelected => "STRATEGY_SELECTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::FilterOptimized => "FILTER_OPTIMIZED",
            Event::LimitReached => "LIMIT_REACHED",
            Event::OrderedMergeComplete => "ORDERED_MERGE_COMPLETE",
            Event::SequenceClosed => "SEQUENCE_CLOSED",
            Event::CloseFailed => "CLOSE_FAILED",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::QueryRejected | Event::CloseFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
