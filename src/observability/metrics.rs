//! Merge metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe, lock-free
//!
//! One registry is typically shared (via `Arc`) by every merger in a process.
//! Each query execution only ever increments it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing merge activity
#[derive(Debug, Default)]
pub struct MergeMetrics {
    /// Queries that produced an output sequence
    queries_merged: AtomicU64,
    /// Queries rejected during validation
    queries_rejected: AtomicU64,
    /// Queries passed through unchanged
    pass_through: AtomicU64,
    /// Queries truncated locally
    local_limit: AtomicU64,
    /// Queries merged in time order
    ordered_merge: AtomicU64,
    /// Records offered to the bounded ordered merge
    records_ordered: AtomicU64,
    /// Records evicted from the bounded ordered merge
    records_evicted: AtomicU64,
}

impl MergeMetrics {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment queries merged
    pub fn increment_queries_merged(&self) {
        self.queries_merged.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment queries rejected
    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment pass-through strategy count
    pub fn increment_pass_through(&self) {
        self.pass_through.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment local limit strategy count
    pub fn increment_local_limit(&self) {
        self.local_limit.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment ordered merge strategy count
    pub fn increment_ordered_merge(&self) {
        self.ordered_merge.fetch_add(1, Ordering::Relaxed);
    }

    /// Add records scanned and evicted by one ordered merge
    pub fn add_ordered_records(&self, scanned: u64, evicted: u64) {
        self.records_ordered.fetch_add(scanned, Ordering::Relaxed);
        self.records_evicted.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics as JSON
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"queries_merged":{},"queries_rejected":{},"pass_through":{},"local_limit":{},"ordered_merge":{},"records_ordered":{},"records_evicted":{}}}"#,
            s.queries_merged,
            s.queries_rejected,
            s.pass_through,
            s.local_limit,
            s.ordered_merge,
            s.records_ordered,
            s.records_evicted,
        )
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_merged: self.queries_merged.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            pass_through: self.pass_through.load(Ordering::Relaxed),
            local_limit: self.local_limit.load(Ordering::Relaxed),
            ordered_merge: self.ordered_merge.load(Ordering::Relaxed),
            records_ordered: self.records_ordered.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queries_merged: u64,
    pub queries_rejected: u64,
    pub pass_through: u64,
    pub local_limit: u64,
    pub ordered_merge: u64,
    pub records_ordered: u64,
    pub records_evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MergeMetrics::new().snapshot();
        assert_eq!(snapshot.queries_merged, 0);
        assert_eq!(snapshot.records_evicted, 0);
    }

    #[test]
    fn test_increment_counters() {
        let metrics = MergeMetrics::new();
        metrics.increment_queries_merged();
        metrics.increment_queries_merged();
        metrics.increment_queries_rejected();
        metrics.increment_ordered_merge();
        metrics.add_ordered_records(10, 6);
        metrics.add_ordered_records(5, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries_merged, 2);
        assert_eq!(snapshot.queries_rejected, 1);
        assert_eq!(snapshot.ordered_merge, 1);
        assert_eq!(snapshot.records_ordered, 15);
        assert_eq!(snapshot.records_evicted, 7);
    }

    #[test]
    fn test_to_json() {
        let metrics = MergeMetrics::new();
        metrics.increment_local_limit();

        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["local_limit"], 1);
        assert_eq!(parsed["pass_through"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(MergeMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.increment_queries_merged();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().queries_merged, 800);
    }
}
