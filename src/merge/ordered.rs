//! Bounded top-K time ordering
//!
//! Selects the first `limit` records in time order from an unordered stream
//! while holding at most `limit` records at once. O(n log limit) time,
//! O(limit) space.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::observability::{log_event_with_fields, Event, Logger};
use crate::query::TimeOrder;
use crate::result::{Batch, Record};
use crate::sequence::{close_logged, exhausted, PullSequence};

use super::cursor::RecordCursor;
use super::errors::{with_close_result, MergeError, MergeResult};

/// Upper bound on the queue's up-front allocation; large limits grow on demand.
const INITIAL_QUEUE_CAPACITY: usize = 1024;

/// Counters for one ordered merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records read from the input
    pub records_scanned: u64,
    /// Records pushed out of the queue by better ones
    pub records_evicted: u64,
    /// Records emitted
    pub records_retained: u64,
}

/// Output position of a record. Lower ranks are emitted first.
///
/// Every entry of one queue uses the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Ascending(i64),
    Descending(Reverse<i64>),
}

impl Rank {
    fn new(order: TimeOrder, key: i64) -> Self {
        match order {
            TimeOrder::Descending => Rank::Descending(Reverse(key)),
            _ => Rank::Ascending(key),
        }
    }
}

/// Queue entry.
///
/// Ordered so that the greatest entry is the one that would be emitted last:
/// the latest key for ascending output, the earliest for descending, and
/// among equal keys the latest arrival. `BinaryHeap` keeps the greatest on
/// top, so the top is always the entry to evict when the queue overflows.
struct Retained {
    rank: Rank,
    arrival: u64,
    record: Record,
}

impl Ord for Retained {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| self.arrival.cmp(&other.arrival))
    }
}

impl PartialOrd for Retained {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Retained {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Retained {}

struct Selection {
    records: Vec<Record>,
    columns: Vec<String>,
    stats: MergeStats,
}

/// Time-ordered top-K over an unordered input.
///
/// The whole input is consumed and closed on construction. The result is
/// then served as single-record batches carrying the input's column list.
pub struct BoundedOrderedMerge {
    records: std::vec::IntoIter<Record>,
    columns: Vec<String>,
    current: Option<Batch>,
    stats: MergeStats,
}

impl BoundedOrderedMerge {
    /// Consumes `input` and selects its first `limit` records in `order`,
    /// keyed by the named field `time_column`.
    ///
    /// `input` is closed on every path. A close failure after a selection
    /// failure is attached to it as suppressed.
    pub fn new<S: PullSequence>(
        mut input: S,
        order: TimeOrder,
        limit: u64,
        time_column: &str,
        logger: &Logger,
    ) -> MergeResult<Self> {
        let selected = select(&mut input, order, limit, time_column);
        let closed = close_logged(&mut input, "ordered_merge", logger);
        let selection = with_close_result(selected, closed)?;

        let stats = selection.stats;
        let limit = limit.to_string();
        let scanned = stats.records_scanned.to_string();
        let evicted = stats.records_evicted.to_string();
        let retained = stats.records_retained.to_string();
        log_event_with_fields(
            logger,
            Event::OrderedMergeComplete,
            &[
                ("order", order.as_str()),
                ("limit", limit.as_str()),
                ("records_scanned", scanned.as_str()),
                ("records_evicted", evicted.as_str()),
                ("records_retained", retained.as_str()),
            ],
        );

        let mut merge = Self {
            records: selection.records.into_iter(),
            columns: selection.columns,
            current: None,
            stats,
        };
        merge.next_batch();
        Ok(merge)
    }

    /// Returns the selection counters
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    fn next_batch(&mut self) {
        self.current = self
            .records
            .next()
            .map(|record| Batch::single(self.columns.clone(), record));
    }
}

fn select<S: PullSequence + ?Sized>(
    input: &mut S,
    order: TimeOrder,
    limit: u64,
    time_column: &str,
) -> MergeResult<Selection> {
    if !order.is_ordered() {
        return Err(MergeError::invariant_violation(
            "ordered merge requires ascending or descending time order",
        ));
    }
    let capacity = usize::try_from(limit).map_err(|_| {
        MergeError::invariant_violation(format!(
            "limit {} does not fit in an in-memory queue",
            limit
        ))
    })?;

    let mut queue: BinaryHeap<Retained> =
        BinaryHeap::with_capacity(capacity.min(INITIAL_QUEUE_CAPACITY) + 1);
    let mut cursor = RecordCursor::default();
    let mut columns = Vec::new();
    let mut stats = MergeStats::default();

    if capacity > 0 {
        while let Some(record) = cursor.next_record(input, &mut columns)? {
            let rank = Rank::new(order, record.ordering_key(time_column)?);
            queue.push(Retained {
                rank,
                arrival: stats.records_scanned,
                record,
            });
            stats.records_scanned += 1;

            if queue.len() > capacity {
                queue.pop();
                stats.records_evicted += 1;
            }
        }
    }

    stats.records_retained = queue.len() as u64;
    // Ascending by rank is the requested output order
    let records = queue
        .into_sorted_vec()
        .into_iter()
        .map(|entry| entry.record)
        .collect();

    Ok(Selection {
        records,
        columns,
        stats,
    })
}

impl PullSequence for BoundedOrderedMerge {
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
        self.next_batch();
        Ok(())
    }

    fn take(&mut self) -> MergeResult<Batch> {
        let batch = self.current.take().ok_or_else(exhausted)?;
        self.next_batch();
        Ok(batch)
    }

    fn close(&mut self) -> MergeResult<()> {
        self.current = None;
        self.records = Vec::new().into_iter();
        Ok(())
    }
}
