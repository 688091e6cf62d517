//! Pull sequence contract and in-memory implementations

use std::collections::VecDeque;

use crate::merge::{MergeError, MergeResult};
use crate::observability::Logger;
use crate::result::Batch;

use super::drain::{close_logged, Batches};

/// A lazily produced, ordered stream of batches, consumed exactly once.
///
/// The consumer drives progress: `get` reads the current batch, `advance`
/// moves to the next one (possibly doing upstream work). `close` releases
/// whatever the sequence holds; it is idempotent and must be called on every
/// exit path, including after a failed `get` or `advance`.
///
/// Sequences are single-consumer and are never shared across threads.
pub trait PullSequence {
    /// Returns true while a current batch is available
    fn has_more(&self) -> bool;

    /// Returns the current batch. Only valid while `has_more()` is true.
    fn get(&self) -> MergeResult<&Batch>;

    /// Moves to the next batch
    fn advance(&mut self) -> MergeResult<()>;

    /// Releases held resources. Safe to call more than once.
    fn close(&mut self) -> MergeResult<()>;

    /// Returns a copy of the current batch and advances past it
    fn take(&mut self) -> MergeResult<Batch> {
        let batch = self.get()?.clone();
        self.advance()?;
        Ok(batch)
    }

    /// Adapts this sequence into an iterator that closes it when done
    fn batches(self) -> Batches<Self>
    where
        Self: Sized,
    {
        Batches::new(self, Logger::disabled())
    }

    /// Like [`PullSequence::batches`], logging the release through `logger`
    fn batches_with(self, logger: Logger) -> Batches<Self>
    where
        Self: Sized,
    {
        Batches::new(self, logger)
    }
}

impl<S: PullSequence + ?Sized> PullSequence for Box<S> {
    fn has_more(&self) -> bool {
        (**self).has_more()
    }

    fn get(&self) -> MergeResult<&Batch> {
        (**self).get()
    }

    fn advance(&mut self) -> MergeResult<()> {
        (**self).advance()
    }

    fn close(&mut self) -> MergeResult<()> {
        (**self).close()
    }

    fn take(&mut self) -> MergeResult<Batch> {
        (**self).take()
    }
}

pub(crate) fn exhausted() -> MergeError {
    MergeError::invariant_violation("get() called on an exhausted sequence")
}

/// Sequence over batches already in memory
#[derive(Debug, Default)]
pub struct VecSequence {
    batches: VecDeque<Batch>,
    closed: bool,
}

impl VecSequence {
    /// Creates a sequence yielding `batches` in order
    pub fn new(batches: Vec<Batch>) -> Self {
        Self {
            batches: batches.into(),
            closed: false,
        }
    }

    /// Returns true once `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl PullSequence for VecSequence {
    fn has_more(&self) -> bool {
        !self.closed && !self.batches.is_empty()
    }

    fn get(&self) -> MergeResult<&Batch> {
        if self.closed {
            return Err(exhausted());
        }
        self.batches.front().ok_or_else(exhausted)
    }

    fn advance(&mut self) -> MergeResult<()> {
        if self.closed || self.batches.pop_front().is_none() {
            return Err(MergeError::invariant_violation(
                "advance() called on an exhausted sequence",
            ));
        }
        Ok(())
    }

    fn take(&mut self) -> MergeResult<Batch> {
        if self.closed {
            return Err(exhausted());
        }
        self.batches.pop_front().ok_or_else(exhausted)
    }

    fn close(&mut self) -> MergeResult<()> {
        self.closed = true;
        self.batches.clear();
        Ok(())
    }
}

/// Chains per-partition sequences into one stream.
///
/// Each partition is closed exactly once: as soon as it is drained, or when
/// the chain itself is closed. Every partition release is logged.
pub struct ConcatSequence {
    parts: Vec<Box<dyn PullSequence>>,
    part_closed: Vec<bool>,
    current: usize,
    logger: Logger,
}

impl ConcatSequence {
    /// Creates a chain over `parts`, in order
    pub fn new(parts: Vec<Box<dyn PullSequence>>) -> Self {
        let part_closed = vec![false; parts.len()];
        Self {
            parts,
            part_closed,
            current: 0,
            logger: Logger::disabled(),
        }
    }

    /// Logs partition releases through `logger`
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Number of partitions in the chain
    pub fn partition_count(&self) -> usize {
        self.parts.len()
    }

    fn current_part(&self) -> Option<&dyn PullSequence> {
        self.parts[self.current..]
            .iter()
            .map(|p| p.as_ref())
            .find(|p| p.has_more())
    }

    /// Skips and releases drained partitions until one has data or none remain.
    fn settle(&mut self) -> MergeResult<()> {
        while self.current < self.parts.len() && !self.parts[self.current].has_more() {
            self.close_part(self.current)?;
            self.current += 1;
        }
        Ok(())
    }

    fn close_part(&mut self, index: usize) -> MergeResult<()> {
        if self.part_closed[index] {
            return Ok(());
        }
        self.part_closed[index] = true;
        close_logged(&mut self.parts[index], "partition", &self.logger)
    }
}

impl PullSequence for ConcatSequence {
    fn has_more(&self) -> bool {
        self.current_part().is_some()
    }

    fn get(&self) -> MergeResult<&Batch> {
        self.current_part().ok_or_else(exhausted)?.get()
    }

    fn advance(&mut self) -> MergeResult<()> {
        self.settle()?;
        match self.parts.get_mut(self.current) {
            Some(part) => part.advance()?,
            None => {
                return Err(MergeError::invariant_violation(
                    "advance() called on an exhausted sequence",
                ))
            }
        }
        self.settle()
    }

    fn close(&mut self) -> MergeResult<()> {
        let mut failure: Option<MergeError> = None;
        for index in 0..self.parts.len() {
            if let Err(err) = self.close_part(index) {
                failure = Some(match failure {
                    Some(primary) => primary.with_suppressed(err),
                    None => err,
                });
            }
        }
        self.current = self.parts.len();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for ConcatSequence {
    fn drop(&mut self) {
        // Failures were logged per partition
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Record;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn batch(values: &[i64]) -> Batch {
        Batch::new(
            None,
            vec!["v".into()],
            values
                .iter()
                .map(|v| Record::Positional(vec![json!(v)]))
                .collect(),
        )
    }

    struct Counted {
        inner: VecSequence,
        closes: Rc<Cell<usize>>,
        fail_close: bool,
    }

    impl PullSequence for Counted {
        fn has_more(&self) -> bool {
            self.inner.has_more()
        }
        fn get(&self) -> MergeResult<&Batch> {
            self.inner.get()
        }
        fn advance(&mut self) -> MergeResult<()> {
            self.inner.advance()
        }
        fn close(&mut self) -> MergeResult<()> {
            self.closes.set(self.closes.get() + 1);
            self.inner.close()?;
            if self.fail_close {
                return Err(MergeError::close_failed("partition close failed"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_vec_sequence_walks_in_order() {
        let mut seq = VecSequence::new(vec![batch(&[1]), batch(&[2, 3])]);
        assert!(seq.has_more());
        assert_eq!(seq.get().unwrap().len(), 1);
        seq.advance().unwrap();
        assert_eq!(seq.take().unwrap().len(), 2);
        assert!(!seq.has_more());
        assert!(seq.get().is_err());
    }

    #[test]
    fn test_vec_sequence_close_is_idempotent() {
        let mut seq = VecSequence::new(vec![batch(&[1])]);
        seq.close().unwrap();
        seq.close().unwrap();
        assert!(seq.is_closed());
        assert!(!seq.has_more());
    }

    #[test]
    fn test_concat_skips_empty_partitions() {
        let mut seq = ConcatSequence::new(vec![
            Box::new(VecSequence::new(vec![])),
            Box::new(VecSequence::new(vec![batch(&[1])])),
            Box::new(VecSequence::new(vec![])),
            Box::new(VecSequence::new(vec![batch(&[2]), batch(&[3])])),
        ]);

        let mut seen = Vec::new();
        while seq.has_more() {
            seen.push(seq.take().unwrap().records[0].clone());
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], Record::Positional(vec![json!(3)]));
        seq.close().unwrap();
    }

    #[test]
    fn test_concat_closes_each_partition_once() {
        let closes = Rc::new(Cell::new(0));
        let parts: Vec<Box<dyn PullSequence>> = (0..3)
            .map(|i| {
                Box::new(Counted {
                    inner: VecSequence::new(vec![batch(&[i])]),
                    closes: Rc::clone(&closes),
                    fail_close: false,
                }) as Box<dyn PullSequence>
            })
            .collect();

        let mut seq = ConcatSequence::new(parts);
        seq.take().unwrap();
        seq.take().unwrap();
        seq.close().unwrap();
        seq.close().unwrap();
        drop(seq);

        assert_eq!(closes.get(), 3);
    }

    #[test]
    fn test_concat_close_failures_are_suppressed_into_first() {
        let closes = Rc::new(Cell::new(0));
        let parts: Vec<Box<dyn PullSequence>> = (0..3)
            .map(|i| {
                Box::new(Counted {
                    inner: VecSequence::new(vec![batch(&[i])]),
                    closes: Rc::clone(&closes),
                    fail_close: true,
                }) as Box<dyn PullSequence>
            })
            .collect();

        let mut seq = ConcatSequence::new(parts);
        let err = seq.close().unwrap_err();
        assert_eq!(err.suppressed().len(), 2);
        assert_eq!(closes.get(), 3);
    }

    #[test]
    fn test_concat_drop_logs_partition_close_failure() {
        let closes = Rc::new(Cell::new(0));
        let parts: Vec<Box<dyn PullSequence>> = vec![
            Box::new(Counted {
                inner: VecSequence::new(vec![batch(&[1]), batch(&[2])]),
                closes: Rc::clone(&closes),
                fail_close: true,
            }),
            Box::new(VecSequence::new(vec![batch(&[3])])),
        ];
        let (logger, buffer) = Logger::capture();

        let mut seq = ConcatSequence::new(parts).with_logger(logger);
        seq.take().unwrap();
        drop(seq);

        assert_eq!(closes.get(), 1);
        let lines = buffer.lines();
        let failed: Vec<_> = lines.iter().filter(|l| l.contains("CLOSE_FAILED")).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].contains("\"severity\":\"WARN\""));
        assert!(failed[0].contains("partition close failed"));
        assert_eq!(
            lines.iter().filter(|l| l.contains("SEQUENCE_CLOSED")).count(),
            1
        );
    }
}
