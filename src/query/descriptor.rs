//! Scan query descriptor
//!
//! Only the query shape the merge layer needs is modelled here: limit,
//! batch size, time order, result format, outermost flag and filter. Other
//! fields travel opaquely to the underlying runner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::MergeConfig;
use crate::merge::{MergeError, MergeResult};
use crate::result::RecordForm;

use super::filter::Filter;

/// Query context key marking the top of a distributed merge tree
pub const CTX_KEY_OUTERMOST: &str = "outermost";

/// Default number of records per output batch
pub const DEFAULT_BATCH_SIZE: usize = 20480;

/// Requested time ordering of scan results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TimeOrder {
    #[default]
    None,
    Ascending,
    Descending,
}

impl TimeOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOrder::None => "none",
            TimeOrder::Ascending => "ascending",
            TimeOrder::Descending => "descending",
        }
    }

    /// Returns true if results must be time ordered
    pub fn is_ordered(&self) -> bool {
        !matches!(self, TimeOrder::None)
    }
}

impl FromStr for TimeOrder {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(TimeOrder::None),
            "ascending" => Ok(TimeOrder::Ascending),
            "descending" => Ok(TimeOrder::Descending),
            _ => Err(MergeError::unknown_mode("timeOrder", s)),
        }
    }
}

impl TryFrom<String> for TimeOrder {
    type Error = MergeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for TimeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wire shape of result records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum ResultFormat {
    /// Named records
    #[default]
    #[serde(rename = "list")]
    List,
    /// Positional records with a shared column list
    #[serde(rename = "compactedList")]
    CompactedList,
    /// Columnar vectors; not implemented
    #[serde(rename = "valueVector")]
    ValueVector,
}

impl ResultFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultFormat::List => "list",
            ResultFormat::CompactedList => "compactedList",
            ResultFormat::ValueVector => "valueVector",
        }
    }

    /// Returns the record form this format produces.
    ///
    /// Fails for formats the merge layer cannot handle.
    pub fn record_form(&self) -> MergeResult<RecordForm> {
        match self {
            ResultFormat::List => Ok(RecordForm::Named),
            ResultFormat::CompactedList => Ok(RecordForm::Positional),
            ResultFormat::ValueVector => Err(MergeError::unsupported_feature(format!(
                "result format {} is not supported yet",
                self.as_str()
            ))),
        }
    }
}

impl FromStr for ResultFormat {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Ok(ResultFormat::List),
            "compactedlist" => Ok(ResultFormat::CompactedList),
            "valuevector" => Ok(ResultFormat::ValueVector),
            _ => Err(MergeError::unknown_mode("resultFormat", s)),
        }
    }
}

impl TryFrom<String> for ResultFormat {
    type Error = MergeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// A scan query as seen by the merge layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanQuery {
    /// Query identifier, assigned during normalization when absent
    #[serde(default)]
    pub query_id: Option<String>,
    /// Data source being scanned
    pub data_source: String,
    /// Requested columns
    #[serde(default)]
    pub columns: Vec<String>,
    /// Row filter, evaluated by the underlying runner
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Maximum rows returned; `None` is unbounded
    #[serde(default)]
    pub limit: Option<u64>,
    /// Records per output batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Requested time ordering
    #[serde(default)]
    pub time_order: TimeOrder,
    /// Result format; defaulted from config during normalization
    #[serde(default)]
    pub result_format: Option<ResultFormat>,
    /// Legacy column naming; defaulted from config during normalization
    #[serde(default)]
    pub legacy: Option<bool>,
    /// Free-form query context
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl ScanQuery {
    /// Creates a new query over `data_source` with default shape
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            query_id: None,
            data_source: data_source.into(),
            columns: Vec::new(),
            filter: None,
            limit: None,
            batch_size: DEFAULT_BATCH_SIZE,
            time_order: TimeOrder::None,
            result_format: None,
            legacy: None,
            context: Map::new(),
        }
    }

    /// Sets the query id
    pub fn with_query_id(mut self, id: impl Into<String>) -> Self {
        self.query_id = Some(id.into());
        self
    }

    /// Sets the requested columns
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the filter
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the row limit
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the time order
    pub fn with_time_order(mut self, order: TimeOrder) -> Self {
        self.time_order = order;
        self
    }

    /// Sets the result format
    pub fn with_result_format(mut self, format: ResultFormat) -> Self {
        self.result_format = Some(format);
        self
    }

    /// Sets legacy mode
    pub fn with_legacy(mut self, legacy: bool) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// Marks whether this merge sits at the top of the query tree
    pub fn with_outermost(mut self, outermost: bool) -> Self {
        self.context
            .insert(CTX_KEY_OUTERMOST.to_string(), Value::Bool(outermost));
        self
    }

    /// Returns true unless the context says this is an intermediate merge
    pub fn is_outermost(&self) -> bool {
        self.context
            .get(CTX_KEY_OUTERMOST)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Result format, falling back to named records
    pub fn effective_result_format(&self) -> ResultFormat {
        self.result_format.unwrap_or_default()
    }

    /// Checks the query shape itself, independent of configuration
    pub fn validate(&self) -> MergeResult<()> {
        if self.batch_size == 0 {
            return Err(MergeError::invalid_query("batchSize must be greater than 0"));
        }
        Ok(())
    }

    /// Returns a copy with every defaultable field made explicit, so nodes
    /// this query is forwarded to treat it the same way regardless of their
    /// own defaults.
    pub fn normalize(&self, config: &MergeConfig) -> Self {
        let mut query = self.clone();
        if query.legacy.is_none() {
            query.legacy = Some(config.legacy);
        }
        if query.result_format.is_none() {
            query.result_format = Some(config.default_result_format);
        }
        if query.query_id.is_none() {
            query.query_id = Some(Uuid::new_v4().to_string());
        }
        query
    }

    /// Returns a copy whose filter is replaced by its optimized form, and
    /// whether anything changed.
    pub fn with_optimized_filter(&self) -> (Self, bool) {
        let mut query = self.clone();
        let mut changed = false;
        if let Some(filter) = &self.filter {
            let optimized = filter.optimize();
            changed = optimized != *filter;
            query.filter = Some(optimized);
        }
        (query, changed)
    }
}
