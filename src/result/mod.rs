//! Result model for scan merging
//!
//! A batch is the unit of exchange between merge stages: a column list plus
//! records in one of two forms, positional or named. The form is chosen once
//! per query from its result format and never changes within a response.

mod batch;

pub use batch::{Batch, Record, RecordForm};
