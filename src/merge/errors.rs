//! Merge error types
//!
//! Error codes:
//! - SCAN_UNSUPPORTED_FEATURE (REJECT)
//! - SCAN_CONFIGURATION_EXCEEDED (REJECT)
//! - SCAN_INVALID_QUERY (REJECT)
//! - SCAN_UNKNOWN_MODE (FATAL)
//! - SCAN_INVARIANT_VIOLATION (FATAL)
//! - SCAN_UPSTREAM_FAILED (ERROR)
//! - SCAN_CLOSE_FAILED (ERROR)
//!
//! None of these are retried locally. A failure raised while releasing a
//! sequence after another failure is attached to the first one as a
//! suppressed failure, never the other way round.

use std::fmt;

/// Severity levels for merge errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Query rejected before any output was produced
    Reject,
    /// Operation failed, process is healthy
    Error,
    /// Internal guard tripped
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Merge error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeErrorCode {
    /// Requested result format or ordering is not implemented
    UnsupportedFeature,
    /// Ordered query limit exceeds the in-memory ordering ceiling
    ConfigurationExceeded,
    /// Malformed query shape (e.g. zero batch size)
    InvalidQuery,
    /// Unrecognized ordering or result format value
    UnknownMode,
    /// Internal fail-fast guard
    InvariantViolation,
    /// Failure reported by an underlying sequence or runner
    UpstreamFailed,
    /// Failure while releasing a sequence
    CloseFailed,
}

impl MergeErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            MergeErrorCode::UnsupportedFeature => "SCAN_UNSUPPORTED_FEATURE",
            MergeErrorCode::ConfigurationExceeded => "SCAN_CONFIGURATION_EXCEEDED",
            MergeErrorCode::InvalidQuery => "SCAN_INVALID_QUERY",
            MergeErrorCode::UnknownMode => "SCAN_UNKNOWN_MODE",
            MergeErrorCode::InvariantViolation => "SCAN_INVARIANT_VIOLATION",
            MergeErrorCode::UpstreamFailed => "SCAN_UPSTREAM_FAILED",
            MergeErrorCode::CloseFailed => "SCAN_CLOSE_FAILED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            MergeErrorCode::UnsupportedFeature
            | MergeErrorCode::ConfigurationExceeded
            | MergeErrorCode::InvalidQuery => Severity::Reject,
            MergeErrorCode::UnknownMode | MergeErrorCode::InvariantViolation => Severity::Fatal,
            MergeErrorCode::UpstreamFailed | MergeErrorCode::CloseFailed => Severity::Error,
        }
    }
}

impl fmt::Display for MergeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Merge error type with full context
#[derive(Debug, Clone, PartialEq)]
pub struct MergeError {
    code: MergeErrorCode,
    message: String,
    suppressed: Vec<MergeError>,
}

impl MergeError {
    fn new(code: MergeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suppressed: Vec::new(),
        }
    }

    /// Create an unsupported feature error
    pub fn unsupported_feature(reason: impl Into<String>) -> Self {
        Self::new(MergeErrorCode::UnsupportedFeature, reason)
    }

    /// Create a configuration exceeded error for an ordered query whose limit
    /// is above the in-memory ordering ceiling.
    pub fn configuration_exceeded(limit: Option<u64>, ceiling: u64) -> Self {
        let requested = match limit {
            Some(l) => l.to_string(),
            None => "unbounded".to_string(),
        };
        Self::new(
            MergeErrorCode::ConfigurationExceeded,
            format!(
                "Time ordering for result set limit of {} is not supported. Try lowering the \
                 result set size to less than or equal to the time ordering limit of {}, \
                 or set timeOrder to none.",
                requested, ceiling
            ),
        )
    }

    /// Create an invalid query error
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::new(MergeErrorCode::InvalidQuery, reason)
    }

    /// Create an unknown mode error
    pub fn unknown_mode(kind: &str, value: impl Into<String>) -> Self {
        Self::new(
            MergeErrorCode::UnknownMode,
            format!("Unknown {} '{}'", kind, value.into()),
        )
    }

    /// Create an invariant violation error
    pub fn invariant_violation(reason: impl Into<String>) -> Self {
        Self::new(MergeErrorCode::InvariantViolation, reason)
    }

    /// Create an upstream failure error
    pub fn upstream_failed(reason: impl Into<String>) -> Self {
        Self::new(MergeErrorCode::UpstreamFailed, reason)
    }

    /// Create a close failure error
    pub fn close_failed(reason: impl Into<String>) -> Self {
        Self::new(MergeErrorCode::CloseFailed, reason)
    }

    /// Attaches a secondary failure (typically from `close()`) to this one.
    pub fn with_suppressed(mut self, other: MergeError) -> Self {
        self.suppressed.push(other);
        self
    }

    /// Returns the error code
    pub fn code(&self) -> MergeErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Secondary failures raised while cleaning up after this one
    pub fn suppressed(&self) -> &[MergeError] {
        &self.suppressed
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Merge errors are query-validation class or upstream failures; the
    /// merge layer never retries them.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Folds an optional close failure into an operation result.
///
/// A close failure after a successful operation becomes the error. A close
/// failure after a failed operation is attached as suppressed.
pub fn with_close_result<T>(result: MergeResult<T>, closed: MergeResult<()>) -> MergeResult<T> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => Err(err.with_suppressed(close_err)),
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        for suppressed in &self.suppressed {
            write!(f, " (suppressed: {})", suppressed)?;
        }
        Ok(())
    }
}

impl std::error::Error for MergeError {}

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;
