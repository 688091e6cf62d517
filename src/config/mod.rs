//! Merge configuration
//!
//! Loaded once per process from a JSON file (or defaulted) and applied to
//! every query before planning.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::{ResultFormat, DEFAULT_BATCH_SIZE};

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration consumed by the merge orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConfig {
    /// Largest limit for which time ordering may be done in memory
    #[serde(default = "default_max_rows_time_order_queued_in_memory")]
    pub max_rows_time_order_queued_in_memory: u64,

    /// Result format applied to queries that do not name one
    #[serde(default)]
    pub default_result_format: ResultFormat,

    /// Legacy mode applied to queries that do not set it
    #[serde(default)]
    pub legacy: bool,

    /// Reserved field holding the ordering timestamp of named records
    #[serde(default = "default_time_column")]
    pub time_column: String,

    /// Batch size used by the CLI when a query omits it
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
}

fn default_max_rows_time_order_queued_in_memory() -> u64 {
    100_000
}

fn default_time_column() -> String {
    "__time".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_rows_time_order_queued_in_memory: default_max_rows_time_order_queued_in_memory(),
            default_result_format: ResultFormat::default(),
            legacy: false,
            time_column: default_time_column(),
            default_batch_size: default_batch_size(),
        }
    }
}

impl MergeConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: MergeConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the in-memory ordering ceiling
    pub fn with_ordering_ceiling(mut self, ceiling: u64) -> Self {
        self.max_rows_time_order_queued_in_memory = ceiling;
        self
    }

    /// Sets the ordering field
    pub fn with_time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = column.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_rows_time_order_queued_in_memory == 0 {
            return Err(ConfigError::Invalid(
                "maxRowsTimeOrderQueuedInMemory must be > 0".into(),
            ));
        }

        // The bounded merge sizes its queue from the limit, so every limit
        // that passes the ceiling must fit in memory-addressable counts.
        if usize::try_from(self.max_rows_time_order_queued_in_memory).is_err() {
            return Err(ConfigError::Invalid(format!(
                "maxRowsTimeOrderQueuedInMemory {} exceeds the addressable maximum {}",
                self.max_rows_time_order_queued_in_memory,
                usize::MAX
            )));
        }

        if self.time_column.is_empty() {
            return Err(ConfigError::Invalid("timeColumn must not be empty".into()));
        }

        if self.default_batch_size == 0 {
            return Err(ConfigError::Invalid("defaultBatchSize must be > 0".into()));
        }

        Ok(())
    }
}
