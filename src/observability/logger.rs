//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, `severity` second, remaining keys sorted
//! - Synchronous, no buffering
//!
//! A `Logger` is a cheap cloneable handle. Each merge component receives its
//! own handle at construction; there is no process-wide logger.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// In-memory log sink, readable after the fact
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    /// Returns everything logged so far
    pub fn contents(&self) -> String {
        match self.inner.lock() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        }
    }

    /// Returns logged lines in order
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    fn append(&self, line: &[u8]) {
        if let Ok(mut bytes) = self.inner.lock() {
            bytes.extend_from_slice(line);
        }
    }
}

#[derive(Debug, Clone)]
enum Sink {
    /// INFO and below to stdout, WARN and above to stderr
    Console,
    Stderr,
    Buffer(LogBuffer),
    Disabled,
}

/// A structured logger handle that outputs JSON lines
#[derive(Debug, Clone)]
pub struct Logger {
    sink: Sink,
    min_severity: Severity,
}

impl Default for Logger {
    fn default() -> Self {
        Self::console()
    }
}

impl Logger {
    /// Logs to stdout, with warnings and failures on stderr
    pub fn console() -> Self {
        Self {
            sink: Sink::Console,
            min_severity: Severity::Info,
        }
    }

    /// Logs everything to stderr, keeping stdout free for results
    pub fn stderr() -> Self {
        Self {
            sink: Sink::Stderr,
            min_severity: Severity::Info,
        }
    }

    /// Logs into a buffer the caller can inspect
    pub fn capture() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        let logger = Self {
            sink: Sink::Buffer(buffer.clone()),
            min_severity: Severity::Trace,
        };
        (logger, buffer)
    }

    /// Discards everything
    pub fn disabled() -> Self {
        Self {
            sink: Sink::Disabled,
            min_severity: Severity::Fatal,
        }
    }

    /// Drops events below `severity`
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Returns true if events at `severity` would be written
    pub fn enabled(&self, severity: Severity) -> bool {
        !matches!(self.sink, Sink::Disabled) && severity >= self.min_severity
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !self.enabled(severity) {
            return;
        }
        let line = format_line(severity, event, fields);
        match &self.sink {
            Sink::Console if severity >= Severity::Warn => write_line(&mut io::stderr(), &line),
            Sink::Console => write_line(&mut io::stdout(), &line),
            Sink::Stderr => write_line(&mut io::stderr(), &line),
            Sink::Buffer(buffer) => buffer.append(line.as_bytes()),
            Sink::Disabled => {}
        }
    }

    /// Log at INFO level
    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) {
    // Write atomically (one syscall)
    let _ = writer.write_all(line.as_bytes());
    let _ = writer.flush();
}

fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(256);

    output.push_str("{\"event\":\"");
    escape_json_string(&mut output, event);
    output.push_str("\",\"severity\":\"");
    output.push_str(severity.as_str());
    output.push('"');

    let mut sorted_fields: Vec<_> = fields.iter().collect();
    sorted_fields.sort_by_key(|(k, _)| *k);

    for (key, value) in sorted_fields {
        output.push_str(",\"");
        escape_json_string(&mut output, key);
        output.push_str("\":\"");
        escape_json_string(&mut output, value);
        output.push('"');
    }

    output.push_str("}\n");
    output
}

fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}
