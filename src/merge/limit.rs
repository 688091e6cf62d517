//! Row-quota enforcement over a batch sequence
//!
//! Two modes:
//! - Local truncation: batches pass through untouched until the one that
//!   crosses the quota, which is cut from the front.
//! - Per-record: records are pulled one at a time and packed into batches of
//!   at most `batch_size`, for streams that feed the ordered merge.
//!
//! The underlying sequence is released as soon as the quota is met.

use crate::observability::{log_event_with_fields, Event, Logger};
use crate::query::{ResultFormat, ScanQuery, TimeOrder};
use crate::result::{Batch, Record, RecordForm};
use crate::sequence::{close_after_failure, close_logged, exhausted, PullSequence};

use super::cursor::RecordCursor;
use super::errors::{MergeError, MergeResult};

/// How the limit iterator shapes its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    /// Pass batches through, slicing the last one to fit the quota
    LocalTruncation,
    /// Re-pack records one at a time into `batch_size` batches
    PerRecord,
}

impl LimitMode {
    /// Per-record packing is only needed where the ordered merge runs, which
    /// is at the top of the query tree.
    pub fn select(time_order: TimeOrder, outermost: bool) -> Self {
        if time_order.is_ordered() && outermost {
            LimitMode::PerRecord
        } else {
            LimitMode::LocalTruncation
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LimitMode::LocalTruncation => "local_truncation",
            LimitMode::PerRecord => "per_record",
        }
    }
}

/// Query shape the limit iterator is built from
#[derive(Debug, Clone, PartialEq)]
pub struct LimitSpec {
    /// Row quota; `None` is unbounded
    pub limit: Option<u64>,
    pub result_format: ResultFormat,
    pub time_order: TimeOrder,
    pub outermost: bool,
    pub batch_size: usize,
}

impl LimitSpec {
    /// Extracts the limit shape of `query`
    pub fn from_query(query: &ScanQuery) -> Self {
        Self {
            limit: query.limit,
            result_format: query.effective_result_format(),
            time_order: query.time_order,
            outermost: query.is_outermost(),
            batch_size: query.batch_size,
        }
    }

    /// Same shape without a row quota
    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    /// Returns the mode this shape selects
    pub fn mode(&self) -> LimitMode {
        LimitMode::select(self.time_order, self.outermost)
    }

    fn validate(&self) -> MergeResult<RecordForm> {
        let form = self.result_format.record_form()?;
        if self.batch_size == 0 {
            return Err(MergeError::invalid_query("batchSize must be greater than 0"));
        }
        Ok(form)
    }
}

/// Sequence adapter that stops after a row quota.
///
/// The first output batch is prepared on construction, so unsupported
/// formats and upstream failures on the first pull surface before the caller
/// sees any output. The underlying sequence is closed on quota, on
/// exhaustion, on `close`, and on drop, and never more than once.
pub struct LimitIterator<S: PullSequence> {
    inner: S,
    inner_closed: bool,
    mode: LimitMode,
    limit: Option<u64>,
    emitted: u64,
    batch_size: usize,
    form: RecordForm,
    cursor: RecordCursor,
    columns: Vec<String>,
    current: Option<Batch>,
    logger: Logger,
}

impl<S: PullSequence> LimitIterator<S> {
    /// Wraps `inner`. On failure `inner` is closed before returning.
    pub fn new(mut inner: S, spec: LimitSpec, logger: Logger) -> MergeResult<Self> {
        let form = match spec.validate() {
            Ok(form) => form,
            Err(err) => return close_after_failure(&mut inner, err),
        };

        let mut iter = Self {
            inner,
            inner_closed: false,
            mode: spec.mode(),
            limit: spec.limit,
            emitted: 0,
            batch_size: spec.batch_size,
            form,
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

    /// Returns the selected mode
    pub fn mode(&self) -> LimitMode {
        self.mode
    }

    /// Records handed out so far, including the current batch
    pub fn records_emitted(&self) -> u64 {
        self.emitted
    }

    fn quota_met(&self) -> bool {
        matches!(self.limit, Some(limit) if self.emitted >= limit)
    }

    fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.emitted))
    }

    /// Prepares the next output batch, releasing upstream once nothing more
    /// will be read from it.
    fn fill(&mut self) -> MergeResult<()> {
        self.current = None;
        if !self.quota_met() && !self.inner_closed {
            self.current = match self.mode {
                LimitMode::LocalTruncation => self.next_truncated()?,
                LimitMode::PerRecord => self.next_packed()?,
            };
        }

        if self.quota_met() && !self.inner_closed {
            let limit = self.limit.unwrap_or_default().to_string();
            log_event_with_fields(
                &self.logger,
                Event::LimitReached,
                &[("limit", limit.as_str()), ("mode", self.mode.as_str())],
            );
            self.release()?;
        } else if self.current.is_none() {
            self.release()?;
        }
        Ok(())
    }

    fn next_truncated(&mut self) -> MergeResult<Option<Batch>> {
        if !self.inner.has_more() {
            return Ok(None);
        }
        let batch = self.inner.take()?;
        if let Some(form) = batch.record_form()? {
            self.check_form(form)?;
        }

        let len = batch.len();
        let take = match self.remaining() {
            Some(remaining) => usize::try_from(remaining).map_or(len, |r| r.min(len)),
            None => len,
        };
        self.emitted += take as u64;

        if take < len {
            Ok(Some(batch.truncated(take)))
        } else {
            Ok(Some(batch))
        }
    }

    fn next_packed(&mut self) -> MergeResult<Option<Batch>> {
        let mut records: Vec<Record> = Vec::new();
        while records.len() < self.batch_size && !self.quota_met() {
            match self.cursor.next_record(&mut self.inner, &mut self.columns)? {
                Some(record) => {
                    self.check_form(record.form())?;
                    records.push(record);
                    self.emitted += 1;
                }
                None => break,
            }
        }

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(Batch::new(None, self.columns.clone(), records)))
    }

    fn check_form(&self, form: RecordForm) -> MergeResult<()> {
        if form != self.form {
            return Err(MergeError::invariant_violation(format!(
                "expected {} records, upstream produced {}",
                self.form.as_str(),
                form.as_str()
            )));
        }
        Ok(())
    }

    fn release(&mut self) -> MergeResult<()> {
        if self.inner_closed {
            return Ok(());
        }
        self.inner_closed = true;
        close_logged(&mut self.inner, "limit", &self.logger)
    }
}

impl<S: PullSequence> PullSequence for LimitIterator<S> {
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

impl<S: PullSequence> Drop for LimitIterator<S> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
