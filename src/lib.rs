//! scanmerge - result merging for distributed scan queries
//!
//! Takes the raw stream of per-partition scan results and returns what the
//! caller asked for: limited, optionally time ordered, and re-batched, while
//! holding at most `limit` records in memory and releasing every upstream
//! sequence exactly once.

pub mod cli;
pub mod config;
pub mod merge;
pub mod observability;
pub mod query;
pub mod result;
pub mod sequence;
