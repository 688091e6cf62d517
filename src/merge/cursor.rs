//! Record-at-a-time reading over a batch sequence

use crate::result::Record;
use crate::sequence::PullSequence;

use super::errors::MergeResult;

/// Position inside the current batch of a sequence.
///
/// The sequence is only advanced when the next record is requested and the
/// current batch has none left, so no upstream work happens ahead of demand.
#[derive(Debug, Default)]
pub(crate) struct RecordCursor {
    offset: usize,
}

impl RecordCursor {
    /// Returns the next record, skipping empty batches.
    ///
    /// `columns` is filled from the first batch that yields a record and left
    /// alone afterwards.
    pub(crate) fn next_record<S: PullSequence + ?Sized>(
        &mut self,
        seq: &mut S,
        columns: &mut Vec<String>,
    ) -> MergeResult<Option<Record>> {
        while seq.has_more() {
            let batch = seq.get()?;
            if let Some(record) = batch.records.get(self.offset) {
                let record = record.clone();
                if columns.is_empty() {
                    columns.clone_from(&batch.columns);
                }
                self.offset += 1;
                return Ok(Some(record));
            }
            seq.advance()?;
            self.offset = 0;
        }
        Ok(None)
    }
}
