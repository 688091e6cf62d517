//! Merge orchestration
//!
//! Picks one strategy per query and assembles the matching pipeline over the
//! runner's stream:
//!
//! | time order | limit            | outermost | strategy                       |
//! |------------|------------------|-----------|--------------------------------|
//! | none       | unbounded        | any       | pass-through                   |
//! | none       | bounded          | any       | local limit                    |
//! | asc/desc   | above ceiling    | any       | rejected                       |
//! | asc/desc   | within ceiling   | false     | local limit, no re-sort        |
//! | asc/desc   | within ceiling   | true      | limit → ordered merge → batch  |
//!
//! Every rejection happens before the runner is invoked.

use std::sync::Arc;

use serde::Serialize;

use crate::config::MergeConfig;
use crate::observability::{
    log_event_with_fields, Event, Logger, MergeMetrics, ObservationScope,
};
use crate::query::{ScanQuery, TimeOrder};
use crate::result::RecordForm;
use crate::sequence::{PullSequence, ReleaseGuard};

use super::batching::BatchingIterator;
use super::errors::{MergeError, MergeResult};
use super::limit::{LimitIterator, LimitSpec};
use super::ordered::BoundedOrderedMerge;
use super::runner::QueryRunner;

/// Pipeline chosen for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeStrategy {
    /// Runner output returned unchanged, with its release logged
    PassThrough,
    /// Limit iterator in local truncation mode
    LocalLimit { limit: u64 },
    /// Per-record limit iterator, bounded ordered merge, then re-batching
    OrderedMerge { limit: u64, order: TimeOrder },
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::PassThrough => "PASS_THROUGH",
            MergeStrategy::LocalLimit { .. } => "LOCAL_LIMIT",
            MergeStrategy::OrderedMerge { .. } => "ORDERED_MERGE",
        }
    }
}

/// Merges the per-partition results of scan queries.
///
/// A merger holds only configuration and shared counters; all per-query
/// state lives in the sequence returned by [`ScanMerger::merge`].
pub struct ScanMerger {
    config: MergeConfig,
    logger: Logger,
    metrics: Arc<MergeMetrics>,
}

impl ScanMerger {
    /// Creates a merger with its own metrics registry
    pub fn new(config: MergeConfig, logger: Logger) -> Self {
        Self {
            config,
            logger,
            metrics: Arc::new(MergeMetrics::new()),
        }
    }

    /// Reports into a shared metrics registry
    pub fn with_metrics(mut self, metrics: Arc<MergeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MergeMetrics> {
        &self.metrics
    }

    /// Chooses the strategy for `query`, or rejects it.
    ///
    /// `query` is expected to be normalized; a missing result format is read
    /// as named records.
    pub fn plan(&self, query: &ScanQuery) -> MergeResult<MergeStrategy> {
        query.validate()?;
        let form = query.effective_result_format().record_form()?;

        let limit = match (query.time_order.is_ordered(), query.limit) {
            (false, None) => return Ok(MergeStrategy::PassThrough),
            (false, Some(limit)) => return Ok(MergeStrategy::LocalLimit { limit }),
            (true, limit) => limit,
        };

        let ceiling = self.config.max_rows_time_order_queued_in_memory;
        let limit = match limit {
            Some(limit) if limit <= ceiling => limit,
            other => return Err(MergeError::configuration_exceeded(other, ceiling)),
        };

        if !query.is_outermost() {
            // Ordering already happened on the nodes feeding this one
            return Ok(MergeStrategy::LocalLimit { limit });
        }
        if form == RecordForm::Positional {
            return Err(MergeError::unsupported_feature(format!(
                "time ordering is not supported for result format {}",
                query.effective_result_format()
            )));
        }

        Ok(MergeStrategy::OrderedMerge {
            limit,
            order: query.time_order,
        })
    }

    /// Runs `query` through `runner` and returns the merged stream.
    ///
    /// The query is normalized against the configuration and planned before
    /// the runner is called, so a rejected query starts no upstream work.
    /// If assembling the pipeline fails, the runner's stream is closed
    /// before the error is returned.
    pub fn merge(
        &self,
        query: &ScanQuery,
        runner: &dyn QueryRunner,
    ) -> MergeResult<Box<dyn PullSequence>> {
        let query = query.normalize(&self.config);
        let query_id = query.query_id.clone().unwrap_or_default();
        let limit = query
            .limit
            .map_or_else(|| "unbounded".to_string(), |l| l.to_string());

        let scope =
            ObservationScope::with_fields(&self.logger, "SCAN_MERGE", &[("query_id", &query_id)]);
        log_event_with_fields(
            &self.logger,
            Event::MergeStart,
            &[
                ("query_id", &query_id),
                ("data_source", &query.data_source),
                ("time_order", query.time_order.as_str()),
                ("limit", &limit),
            ],
        );

        let strategy = match self.plan(&query) {
            Ok(strategy) => strategy,
            Err(err) => {
                self.metrics.increment_queries_rejected();
                log_event_with_fields(
                    &self.logger,
                    Event::QueryRejected,
                    &[
                        ("query_id", &query_id),
                        ("code", err.code().code()),
                        ("reason", err.message()),
                    ],
                );
                scope.fail(err.message());
                return Err(err);
            }
        };

        let (query, optimized) = query.with_optimized_filter();
        if optimized {
            log_event_with_fields(&self.logger, Event::FilterOptimized, &[("query_id", &query_id)]);
        }

        let built = runner
            .run(&query)
            .and_then(|upstream| self.assemble(&query, strategy, upstream));
        let output = match built {
            Ok(output) => output,
            Err(err) => {
                scope.fail(err.message());
                return Err(err);
            }
        };

        self.metrics.increment_queries_merged();
        match strategy {
            MergeStrategy::PassThrough => self.metrics.increment_pass_through(),
            MergeStrategy::LocalLimit { .. } => self.metrics.increment_local_limit(),
            MergeStrategy::OrderedMerge { .. } => self.metrics.increment_ordered_merge(),
        }
        log_event_with_fields(
            &self.logger,
            Event::StrategySelected,
            &[("query_id", &query_id), ("strategy", strategy.as_str())],
        );
        scope.complete_with_fields(&[("strategy", strategy.as_str())]);
        Ok(output)
    }

    /// Builds the pipeline for `strategy` on top of `upstream`. Each stage
    /// closes its input when its own construction fails.
    fn assemble(
        &self,
        query: &ScanQuery,
        strategy: MergeStrategy,
        upstream: Box<dyn PullSequence>,
    ) -> MergeResult<Box<dyn PullSequence>> {
        match strategy {
            MergeStrategy::PassThrough => Ok(Box::new(ReleaseGuard::new(
                upstream,
                "pass_through",
                self.logger.clone(),
            ))),
            MergeStrategy::LocalLimit { .. } => {
                let spec = LimitSpec::from_query(query);
                Ok(Box::new(LimitIterator::new(
                    upstream,
                    spec,
                    self.logger.clone(),
                )?))
            }
            MergeStrategy::OrderedMerge { limit, order } => {
                // The quota belongs to the ordered merge; cutting earlier
                // would drop records that sort ahead of the ones kept.
                let spec = LimitSpec::from_query(query).unbounded();
                let records = LimitIterator::new(upstream, spec, self.logger.clone())?;
                let merged = BoundedOrderedMerge::new(
                    records,
                    order,
                    limit,
                    &self.config.time_column,
                    &self.logger,
                )?;

                let stats = merged.stats();
                self.metrics
                    .add_ordered_records(stats.records_scanned, stats.records_evicted);
                Ok(Box::new(BatchingIterator::new(
                    merged,
                    query.batch_size,
                    self.logger.clone(),
                )?))
            }
        }
    }
}
