//! Scan query model
//!
//! The descriptor the merge orchestrator plans against, plus the filter tree
//! it optimizes before handing the query to the underlying runner.

mod descriptor;
mod filter;

pub use descriptor::{
    ResultFormat, ScanQuery, TimeOrder, CTX_KEY_OUTERMOST, DEFAULT_BATCH_SIZE,
};
pub use filter::Filter;
