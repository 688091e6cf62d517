//! Consuming a pull sequence with guaranteed release

use crate::merge::{with_close_result, MergeError, MergeResult};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::result::Batch;

use super::pull::PullSequence;

/// Consumes `seq` to the end and closes it.
///
/// The sequence is closed whether or not iteration succeeds. If both
/// iteration and close fail, the close failure is attached to the iteration
/// failure as suppressed.
pub fn drain<S: PullSequence + ?Sized>(seq: &mut S) -> MergeResult<Vec<Batch>> {
    let collected = collect(seq);
    with_close_result(collected, seq.close())
}

/// Closes `seq` after `err` and returns `err`, carrying any close failure
/// as suppressed.
pub fn close_after_failure<S: PullSequence + ?Sized, T>(
    seq: &mut S,
    err: MergeError,
) -> MergeResult<T> {
    with_close_result(Err(err), seq.close())
}

/// Closes `seq` on behalf of `stage`, logging the outcome.
///
/// Success is logged as `SEQUENCE_CLOSED`, failure as `CLOSE_FAILED`. The
/// close result is returned unchanged.
pub fn close_logged<S: PullSequence + ?Sized>(
    seq: &mut S,
    stage: &str,
    logger: &Logger,
) -> MergeResult<()> {
    match seq.close() {
        Ok(()) => {
            log_event_with_fields(logger, Event::SequenceClosed, &[("stage", stage)]);
            Ok(())
        }
        Err(err) => {
            log_event_with_fields(
                logger,
                Event::CloseFailed,
                &[("stage", stage), ("reason", err.message())],
            );
            Err(err)
        }
    }
}

fn collect<S: PullSequence + ?Sized>(seq: &mut S) -> MergeResult<Vec<Batch>> {
    let mut batches = Vec::new();
    while seq.has_more() {
        batches.push(seq.take()?);
    }
    Ok(batches)
}

/// Iterator over the batches of a pull sequence.
///
/// The sequence is closed when the iterator is exhausted, after the first
/// error, or when the iterator is dropped early. A failed close on drop has
/// no caller to return to and is only logged.
pub struct Batches<S: PullSequence> {
    seq: S,
    finished: bool,
    logger: Logger,
}

impl<S: PullSequence> Batches<S> {
    pub(crate) fn new(seq: S, logger: Logger) -> Self {
        Self {
            seq,
            finished: false,
            logger,
        }
    }

    fn release(&mut self) -> MergeResult<()> {
        self.finished = true;
        close_logged(&mut self.seq, "batches", &self.logger)
    }
}

impl<S: PullSequence> Iterator for Batches<S> {
    type Item = MergeResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if !self.seq.has_more() {
            return self.release().err().map(Err);
        }
        match self.seq.take() {
            Ok(batch) => Some(Ok(batch)),
            Err(err) => {
                let closed = self.release();
                Some(with_close_result(Err(err), closed))
            }
        }
    }
}

impl<S: PullSequence> Drop for Batches<S> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Record;
    use crate::sequence::VecSequence;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn batch(v: i64) -> Batch {
        Batch::single(vec!["v".into()], Record::Positional(vec![json!(v)]))
    }

    /// Fails on the n-th advance, optionally also failing close
    struct Flaky {
        inner: VecSequence,
        fail_after: usize,
        advances: usize,
        fail_close: bool,
        closes: Rc<Cell<usize>>,
    }

    impl PullSequence for Flaky {
        fn has_more(&self) -> bool {
            self.inner.has_more()
        }
        fn get(&self) -> MergeResult<&Batch> {
            self.inner.get()
        }
        fn advance(&mut self) -> MergeResult<()> {
            self.advances += 1;
            if self.advances > self.fail_after {
                return Err(MergeError::upstream_failed("partition went away"));
            }
            self.inner.advance()
        }
        fn close(&mut self) -> MergeResult<()> {
            self.closes.set(self.closes.get() + 1);
            self.inner.close()?;
            if self.fail_close {
                return Err(MergeError::close_failed("release failed"));
            }
            Ok(())
        }
    }

    fn flaky(fail_after: usize, fail_close: bool) -> (Flaky, Rc<Cell<usize>>) {
        let closes = Rc::new(Cell::new(0));
        let seq = Flaky {
            inner: VecSequence::new((0..5).map(batch).collect()),
            fail_after,
            advances: 0,
            fail_close,
            closes: Rc::clone(&closes),
        };
        (seq, closes)
    }

    #[test]
    fn test_drain_collects_and_closes() {
        let (mut seq, closes) = flaky(usize::MAX, false);
        let batches = drain(&mut seq).unwrap();
        assert_eq!(batches.len(), 5);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_drain_closes_on_failure_and_suppresses_close_error() {
        let (mut seq, closes) = flaky(2, true);
        let err = drain(&mut seq).unwrap_err();

        assert_eq!(err.code().code(), "SCAN_UPSTREAM_FAILED");
        assert_eq!(err.suppressed().len(), 1);
        assert_eq!(err.suppressed()[0].code().code(), "SCAN_CLOSE_FAILED");
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_batches_iterator_closes_when_dropped_early() {
        let (seq, closes) = flaky(usize::MAX, false);
        let mut iter = seq.batches();
        assert!(iter.next().unwrap().is_ok());
        drop(iter);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_batches_iterator_logs_close_failure_on_drop() {
        let (seq, closes) = flaky(usize::MAX, true);
        let (logger, buffer) = Logger::capture();
        let mut iter = seq.batches_with(logger);
        assert!(iter.next().unwrap().is_ok());
        drop(iter);

        assert_eq!(closes.get(), 1);
        let line = buffer
            .lines()
            .into_iter()
            .find(|l| l.contains("CLOSE_FAILED"))
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["severity"], "WARN");
        assert_eq!(parsed["stage"], "batches");
        assert_eq!(parsed["reason"], "release failed");
    }

    #[test]
    fn test_batches_iterator_returns_close_failure_at_end() {
        let (seq, closes) = flaky(usize::MAX, true);
        let results: Vec<_> = seq.batches().collect();

        assert_eq!(results.len(), 6);
        let err = results[5].as_ref().unwrap_err();
        assert_eq!(err.code().code(), "SCAN_CLOSE_FAILED");
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_close_logged_reports_success_at_trace() {
        let mut seq = VecSequence::new(vec![batch(1)]);
        let (logger, buffer) = Logger::capture();
        close_logged(&mut seq, "partition", &logger).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&buffer.contents()).unwrap();
        assert_eq!(parsed["event"], "SEQUENCE_CLOSED");
        assert_eq!(parsed["severity"], "TRACE");
        assert_eq!(parsed["stage"], "partition");
        assert!(seq.is_closed());
    }

    #[test]
    fn test_batches_iterator_stops_after_error() {
        let (seq, closes) = flaky(1, false);
        let results: Vec<_> = seq.batches().collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(closes.get(), 1);
    }
}
