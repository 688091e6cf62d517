//! Resource Safety Tests
//!
//! Every sequence a runner hands to the merger must be closed exactly once:
//! - when the consumer abandons the output early
//! - when the quota is met before upstream is exhausted
//! - when iteration or pipeline construction fails
//!
//! Close failures after another failure are attached to it as suppressed,
//! never replacing it.

use std::cell::Cell;
use std::rc::Rc;

use scanmerge::config::MergeConfig;
use scanmerge::merge::{MergeError, MergeResult, ScanMerger};
use scanmerge::observability::{LogBuffer, Logger};
use scanmerge::query::{ResultFormat, ScanQuery, TimeOrder};
use scanmerge::result::{Batch, Record};
use scanmerge::sequence::{drain, PullSequence, VecSequence};
use serde_json::{json, Map};

// =============================================================================
// Test Utilities
// =============================================================================

/// Upstream double counting closes, with injectable failures
struct Tracked {
    inner: VecSequence,
    closes: Rc<Cell<usize>>,
    advances: usize,
    fail_after: Option<usize>,
    fail_close: bool,
}

impl PullSequence for Tracked {
    fn has_more(&self) -> bool {
        self.inner.has_more()
    }

    fn get(&self) -> MergeResult<&Batch> {
        self.inner.get()
    }

    fn advance(&mut self) -> MergeResult<()> {
        self.advances += 1;
        if matches!(self.fail_after, Some(n) if self.advances > n) {
            return Err(MergeError::upstream_failed("connection reset by historical"));
        }
        self.inner.advance()
    }

    fn close(&mut self) -> MergeResult<()> {
        self.closes.set(self.closes.get() + 1);
        self.inner.close()?;
        if self.fail_close {
            return Err(MergeError::close_failed("failed to release connection"));
        }
        Ok(())
    }
}

struct Upstream {
    batches: Vec<Batch>,
    fail_after: Option<usize>,
    fail_close: bool,
    closes: Rc<Cell<usize>>,
    runs: Rc<Cell<usize>>,
}

impl Upstream {
    fn new(batches: Vec<Batch>) -> Self {
        Self {
            batches,
            fail_after: None,
            fail_close: false,
            closes: Rc::new(Cell::new(0)),
            runs: Rc::new(Cell::new(0)),
        }
    }

    fn failing_after(mut self, advances: usize) -> Self {
        self.fail_after = Some(advances);
        self
    }

    fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn run(&self, _query: &ScanQuery) -> MergeResult<Box<dyn PullSequence>> {
        self.runs.set(self.runs.get() + 1);
        Ok(Box::new(Tracked {
            inner: VecSequence::new(self.batches.clone()),
            closes: Rc::clone(&self.closes),
            advances: 0,
            fail_after: self.fail_after,
            fail_close: self.fail_close,
        }))
    }
}

fn named_batches(count: i64) -> Vec<Batch> {
    (0..count)
        .map(|ts| {
            let mut fields = Map::new();
            fields.insert("__time".into(), json!(ts));
            Batch::single(vec!["__time".into()], Record::Named(fields))
        })
        .collect()
}

fn positional_batches(count: i64) -> Vec<Batch> {
    (0..count)
        .map(|v| Batch::single(vec!["v".into()], Record::Positional(vec![json!(v)])))
        .collect()
}

fn warn_lines(buffer: &LogBuffer, event: &str) -> Vec<String> {
    buffer
        .lines()
        .into_iter()
        .filter(|l| l.contains(event) && l.contains("\"severity\":\"WARN\""))
        .collect()
}

fn merger() -> ScanMerger {
    ScanMerger::new(MergeConfig::default(), Logger::disabled())
}

fn compacted() -> ScanQuery {
    ScanQuery::new("wiki").with_result_format(ResultFormat::CompactedList)
}

// =============================================================================
// Early Termination
// =============================================================================

/// Abandoning the output after N pulls closes upstream exactly once.
#[test]
fn test_abandoned_iteration_closes_once() {
    for pulls in 0..4 {
        let upstream = Upstream::new(positional_batches(10));
        let runner = |q: &ScanQuery| upstream.run(q);

        let mut out = merger()
            .merge(&compacted().with_limit(8), &runner)
            .unwrap();
        for _ in 0..pulls {
            out.take().unwrap();
        }
        drop(out);

        assert_eq!(upstream.closes.get(), 1, "after {} pulls", pulls);
    }
}

/// Abandoning a pass-through stream through the iterator adapter also closes.
#[test]
fn test_abandoned_iterator_adapter_closes_once() {
    let upstream = Upstream::new(positional_batches(10));
    let runner = |q: &ScanQuery| upstream.run(q);

    let out = merger().merge(&compacted(), &runner).unwrap();
    let first: Vec<_> = out.batches().take(2).collect();
    assert_eq!(first.len(), 2);
    assert_eq!(upstream.closes.get(), 1);
}

/// Meeting the quota releases upstream before the consumer finishes.
#[test]
fn test_quota_met_releases_upstream_early() {
    let upstream = Upstream::new(positional_batches(10));
    let runner = |q: &ScanQuery| upstream.run(q);

    let mut out = merger()
        .merge(&compacted().with_limit(1), &runner)
        .unwrap();
    assert!(out.has_more());
    assert_eq!(upstream.closes.get(), 1);

    out.close().unwrap();
    drop(out);
    assert_eq!(upstream.closes.get(), 1);
}

/// The ordered merge reads and closes upstream while the pipeline is built.
#[test]
fn test_ordered_merge_closes_upstream_during_merge() {
    let upstream = Upstream::new(named_batches(10));
    let runner = |q: &ScanQuery| upstream.run(q);
    let query = ScanQuery::new("wiki")
        .with_limit(3)
        .with_time_order(TimeOrder::Descending);

    let mut out = merger().merge(&query, &runner).unwrap();
    assert_eq!(upstream.closes.get(), 1);

    let batches = drain(&mut out).unwrap();
    assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), 3);
    assert_eq!(upstream.closes.get(), 1);
}

// =============================================================================
// Failures
// =============================================================================

/// An upstream failure mid-iteration still closes upstream, and a failing
/// close is attached as suppressed.
#[test]
fn test_failure_mid_iteration_suppresses_close_failure() {
    let upstream = Upstream::new(positional_batches(10))
        .failing_after(3)
        .failing_close();
    let runner = |q: &ScanQuery| upstream.run(q);

    let mut out = merger()
        .merge(&compacted().with_limit(9), &runner)
        .unwrap();
    let err = drain(&mut out).unwrap_err();

    assert_eq!(err.code().code(), "SCAN_UPSTREAM_FAILED");
    assert_eq!(err.suppressed().len(), 1);
    assert_eq!(err.suppressed()[0].code().code(), "SCAN_CLOSE_FAILED");
    assert_eq!(upstream.closes.get(), 1);
}

/// A failure while building the ordered pipeline closes upstream before the
/// error is returned.
#[test]
fn test_construction_failure_closes_upstream() {
    let upstream = Upstream::new(named_batches(5)).failing_after(2);
    let runner = |q: &ScanQuery| upstream.run(q);
    let query = ScanQuery::new("wiki")
        .with_limit(3)
        .with_time_order(TimeOrder::Ascending);

    let err = merger().merge(&query, &runner).err().unwrap();
    assert_eq!(err.code().code(), "SCAN_UPSTREAM_FAILED");
    assert_eq!(upstream.closes.get(), 1);
}

/// Mixed record forms are rejected, and upstream is still released.
#[test]
fn test_record_form_mismatch_closes_upstream() {
    let upstream = Upstream::new(named_batches(3));
    let runner = |q: &ScanQuery| upstream.run(q);

    let err = merger()
        .merge(&compacted().with_limit(2), &runner)
        .err()
        .unwrap();
    assert_eq!(err.code().code(), "SCAN_INVARIANT_VIOLATION");
    assert_eq!(upstream.closes.get(), 1);
}

/// Dropping pass-through output over a failing upstream logs the failed
/// release instead of losing it.
#[test]
fn test_pass_through_drop_logs_close_failure() {
    let upstream = Upstream::new(positional_batches(4)).failing_close();
    let runner = |q: &ScanQuery| upstream.run(q);
    let (logger, buffer) = Logger::capture();
    let merger = ScanMerger::new(MergeConfig::default(), logger);

    let mut out = merger.merge(&compacted(), &runner).unwrap();
    out.take().unwrap();
    drop(out);

    assert_eq!(upstream.closes.get(), 1);
    let failed = warn_lines(&buffer, "CLOSE_FAILED");
    assert_eq!(failed.len(), 1);
    assert!(failed[0].contains("pass_through"));
    assert!(failed[0].contains("failed to release connection"));
}

/// Abandoning the iterator adapter over a failing upstream logs the failure
/// at each stage it passes through.
#[test]
fn test_iterator_adapter_drop_logs_close_failure() {
    let upstream = Upstream::new(positional_batches(4)).failing_close();
    let runner = |q: &ScanQuery| upstream.run(q);
    let (logger, buffer) = Logger::capture();
    let merger = ScanMerger::new(MergeConfig::default(), logger.clone());

    let out = merger.merge(&compacted().with_limit(3), &runner).unwrap();
    let mut batches = out.batches_with(logger);
    assert!(batches.next().unwrap().is_ok());
    drop(batches);

    assert_eq!(upstream.closes.get(), 1);
    let failed = warn_lines(&buffer, "CLOSE_FAILED");
    assert_eq!(failed.len(), 2);
    assert!(failed[0].contains("\"stage\":\"limit\""));
    assert!(failed[1].contains("\"stage\":\"batches\""));
}

/// Rejected queries never open upstream at all.
#[test]
fn test_rejected_query_opens_nothing() {
    let upstream = Upstream::new(named_batches(3));
    let runner = |q: &ScanQuery| upstream.run(q);
    let query = ScanQuery::new("wiki").with_time_order(TimeOrder::Ascending);

    assert!(merger().merge(&query, &runner).is_err());
    assert_eq!(upstream.runs.get(), 0);
    assert_eq!(upstream.closes.get(), 0);
}
