//! Re-chunking of record streams into fixed-size batches

use crate::observability::Logger;
use crate::result::{Batch, Record};
use crate::sequence::{close_after_failure, close_logged, exhausted, PullSequence};

use super::cursor::RecordCursor;
use super::errors::{MergeError, MergeResult};

/// Packs the records of `inner` into batches of `batch_size`.
///
/// Every output batch but the last holds exactly `batch_size` records. The
/// column list of the first non-empty input batch is applied to all output.
/// Record order is unchanged.
pub struct BatchingIterator<S: PullSequence> {
    inner: S,
    inner_closed: bool,
    batch_size: usize,
    cursor: RecordCursor,
    columns: Vec<String>,
    current: Option<Batch>,
    logger: Logger,
}

impl<S: PullSequence> BatchingIterator<S> {
    /// Wraps `inner`. On failure `inner` is closed before returning.
    pub fn new(mut inner: S, batch_size: usize, logger: Logger) -> MergeResult<Self> {
        if batch_size == 0 {
            return close_after_failure(
                &mut inner,
                MergeError::invalid_query("batchSize must be greater than 0"),
            );
        }

        let mut iter = Self {
            inner,
            inner_closed: false,
            batch_size,
            cursor: RecordCursor::default(),
            columns: Vec::new(),
            current: None,
            logger,
        };
        if let Err(err) = iter.fill() {
            return close_after_failure(&mut iter, err);
        }
        Ok(iter)
    }

    fn fill(&mut self) -> MergeResult<()> {
        let mut records: Vec<Record> = Vec::with_capacity(self.batch_size.min(1024));
        while records.len() < self.batch_size {
            match self.cursor.next_record(&mut self.inner, &mut self.columns)? {
                Some(record) => records.push(record),
                None => break,
            }
        }

        if records.is_empty() {
            self.current = None;
            return self.release();
        }
        self.current = Some(Batch::new(None, self.columns.clone(), records));
        Ok(())
    }

    fn release(&mut self) -> MergeResult<()> {
        if self.inner_closed {
            return Ok(());
        }
        self.inner_closed = true;
        close_logged(&mut self.inner, "batching", &self.logger)
    }
}

impl<S: PullSequence> PullSequence for BatchingIterator<S> {
    fn has_more(&self) -> bool {
        self.current.is_some()
    }

    fn get(&self) -> MergeResult<&Batch> {
        self.current.as_ref().ok_or_else(exhausted)
    }

    fn advance(&mut self) -> MergeResult<()> {
        if self.current.is_none() {
            return Err(MergeError::invariant_violation(
                "advance() called on an exhausted sequence",
            ));
        }
        self.fill()
    }

    fn take(&mut self) -> MergeResult<Batch> {
        let batch = self.current.take().ok_or_else(exhausted)?;
        self.fill()?;
        Ok(batch)
    }

    fn close(&mut self) -> MergeResult<()> {
        self.current = None;
        self.release()
    }
}

impl<S: PullSequence> Drop for BatchingIterator<S> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
