//! Records and batches exchanged between merge stages

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::merge::{MergeError, MergeResult};

/// Record representation, fixed once per query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordForm {
    /// Ordered values, schema given by the batch's column list
    Positional,
    /// Field name to value
    Named,
}

impl RecordForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordForm::Positional => "positional",
            RecordForm::Named => "named",
        }
    }
}

/// One logical result row.
///
/// Serializes as a JSON array (positional) or a JSON object (named), so a
/// batch written by one node reads back with the same form on the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Record {
    /// Returns the representation of this record
    pub fn form(&self) -> RecordForm {
        match self {
            Record::Positional(_) => RecordForm::Positional,
            Record::Named(_) => RecordForm::Named,
        }
    }

    /// Reads the ordering key from a named record.
    ///
    /// Positional records carry no reserved field and cannot be time ordered.
    pub fn ordering_key(&self, time_column: &str) -> MergeResult<i64> {
        match self {
            Record::Named(fields) => fields
                .get(time_column)
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    MergeError::invariant_violation(format!(
                        "record has no integer ordering key '{}'",
                        time_column
                    ))
                }),
            Record::Positional(_) => Err(MergeError::unsupported_feature(
                "time ordering is not supported for positional records",
            )),
        }
    }
}

/// A chunk of result records sharing a column schema
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Batch {
    /// Partition or segment that produced the batch, if known
    #[serde(rename = "segmentId", default)]
    pub source_id: Option<String>,
    /// Column names; defines field order for positional records
    #[serde(default)]
    pub columns: Vec<String>,
    /// Records in stream order
    #[serde(rename = "events", default)]
    pub records: Vec<Record>,
}

impl Batch {
    /// Creates a new batch
    pub fn new(source_id: Option<String>, columns: Vec<String>, records: Vec<Record>) -> Self {
        Self {
            source_id,
            columns,
            records,
        }
    }

    /// Creates a batch holding a single record
    pub fn single(columns: Vec<String>, record: Record) -> Self {
        Self::new(None, columns, vec![record])
    }

    /// Returns the number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns a batch holding the first `count` records, keeping source and
    /// columns. Used when a batch straddles the end of a row quota.
    pub fn truncated(&self, count: usize) -> Self {
        let count = count.min(self.records.len());
        Self {
            source_id: self.source_id.clone(),
            columns: self.columns.clone(),
            records: self.records[..count].to_vec(),
        }
    }

    /// Returns the record form shared by this batch, or `None` if empty.
    ///
    /// Fails if the batch mixes positional and named records.
    pub fn record_form(&self) -> MergeResult<Option<RecordForm>> {
        let mut forms = self.records.iter().map(Record::form);
        let first = match forms.next() {
            Some(form) => form,
            None => return Ok(None),
        };
        if forms.any(|form| form != first) {
            return Err(MergeError::invariant_violation(
                "batch mixes positional and named records",
            ));
        }
        Ok(Some(first))
    }
}
