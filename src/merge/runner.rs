//! Source of the raw, unmerged per-partition stream

use crate::observability::Logger;
use crate::query::ScanQuery;
use crate::result::Batch;
use crate::sequence::{ConcatSequence, PullSequence, VecSequence};

use super::errors::MergeResult;

/// Executes a scan query below the merge layer.
///
/// The returned sequence is owned by the merger from then on and is closed
/// by it on every path.
pub trait QueryRunner {
    fn run(&self, query: &ScanQuery) -> MergeResult<Box<dyn PullSequence>>;
}

impl<F> QueryRunner for F
where
    F: Fn(&ScanQuery) -> MergeResult<Box<dyn PullSequence>>,
{
    fn run(&self, query: &ScanQuery) -> MergeResult<Box<dyn PullSequence>> {
        self(query)
    }
}

/// Runner over partitions already held in memory.
///
/// Each run yields every partition's batches, partition by partition, in
/// the order given. The query itself is not evaluated.
#[derive(Debug, Clone, Default)]
pub struct PartitionRunner {
    partitions: Vec<Vec<Batch>>,
    logger: Option<Logger>,
}

impl PartitionRunner {
    pub fn new(partitions: Vec<Vec<Batch>>) -> Self {
        Self {
            partitions,
            logger: None,
        }
    }

    /// Logs partition releases through `logger`
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Number of partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

impl QueryRunner for PartitionRunner {
    fn run(&self, _query: &ScanQuery) -> MergeResult<Box<dyn PullSequence>> {
        let parts = self
            .partitions
            .iter()
            .map(|batches| Box::new(VecSequence::new(batches.clone())) as Box<dyn PullSequence>)
            .collect();
        let chain = ConcatSequence::new(parts);
        Ok(Box::new(match &self.logger {
            Some(logger) => chain.with_logger(logger.clone()),
            None => chain,
        }))
    }
}
