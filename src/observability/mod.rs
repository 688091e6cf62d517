//! Observability for scan merging
//!
//! - Structured logging (JSON lines) through injected `Logger` handles
//! - Counter metrics
//! - Typed lifecycle events
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on merge results
//! 3. No background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use scanmerge::observability::{log_event_with_fields, Event, Logger, MergeMetrics};
//!
//! let logger = Logger::console();
//! log_event_with_fields(&logger, Event::MergeStart, &[("query_id", "q1")]);
//!
//! let metrics = MergeMetrics::new();
//! metrics.increment_queries_merged();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{LogBuffer, Logger, Severity};
pub use metrics::{MergeMetrics, MetricsSnapshot};
pub use scope::ObservationScope;

fn severity_for(event: Event) -> Severity {
    match event {
        Event::SequenceClosed => Severity::Trace,
        event if event.is_failure() => Severity::Warn,
        _ => Severity::Info,
    }
}

/// Log a lifecycle event
pub fn log_event(logger: &Logger, event: Event) {
    logger.log(severity_for(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(logger: &Logger, event: Event, fields: &[(&str, &str)]) {
    logger.log(severity_for(event), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        let (logger, buffer) = Logger::capture();
        log_event(&logger, Event::MergeStart);
        assert!(buffer.contents().contains("MERGE_START"));
    }

    #[test]
    fn test_failure_events_log_as_warn() {
        let (logger, buffer) = Logger::capture();
        log_event_with_fields(&logger, Event::CloseFailed, &[("reason", "gone")]);

        let parsed: serde_json::Value = serde_json::from_str(&buffer.contents()).unwrap();
        assert_eq!(parsed["severity"], "WARN");
        assert_eq!(parsed["reason"], "gone");
    }

    #[test]
    fn test_sequence_closed_logs_as_trace() {
        let (logger, buffer) = Logger::capture();
        log_event_with_fields(&logger, Event::SequenceClosed, &[("stage", "limit")]);

        let parsed: serde_json::Value = serde_json::from_str(&buffer.contents()).unwrap();
        assert_eq!(parsed["event"], "SEQUENCE_CLOSED");
        assert_eq!(parsed["severity"], "TRACE");

        let (quiet, buffer) = Logger::capture();
        let quiet = quiet.with_min_severity(Severity::Info);
        log_event(&quiet, Event::SequenceClosed);
        assert!(buffer.contents().is_empty());
    }
}
