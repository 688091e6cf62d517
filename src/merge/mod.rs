//! Scan result merging
//!
//! Turns the raw per-partition stream of a scan query into the stream the
//! caller asked for: limited, time ordered and re-batched as required.
//!
//! # Pipeline
//!
//! ```text
//! runner ─▶ LimitIterator ─▶ [BoundedOrderedMerge ─▶ BatchingIterator] ─▶ caller
//! ```
//!
//! # Guarantees
//!
//! - Validation failures surface before any upstream work starts
//! - At most `limit` records are held in memory while ordering
//! - Every sequence taken from the runner is closed exactly once

mod batching;
mod cursor;
mod errors;
mod limit;
mod merger;
mod ordered;
mod runner;

pub use batching::BatchingIterator;
pub use errors::{with_close_result, MergeError, MergeErrorCode, MergeResult, Severity};
pub use limit::{LimitIterator, LimitMode, LimitSpec};
pub use merger::{MergeStrategy, ScanMerger};
pub use ordered::{BoundedOrderedMerge, MergeStats};
pub use runner::{PartitionRunner, QueryRunner};
