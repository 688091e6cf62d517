//! JSON file and line I/O for the CLI
//!
//! - Inputs are whole JSON documents read from files
//! - Output is one JSON object per line
//! - UTF-8 only

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read a JSON document from `path` as a raw value
pub fn read_json_value(path: &Path) -> CliResult<Value> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("Failed to read {}: {}", path.display(), e)))?;
    if content.trim().is_empty() {
        return Err(CliError::io_error(format!("{} is empty", path.display())));
    }
    Ok(serde_json::from_str(&content)?)
}

/// Read a JSON document from `path` into `T`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let value = read_json_value(path)?;
    Ok(serde_json::from_value(value)?)
}

/// Write `value` as a single JSON line
pub fn write_json_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"a": [1, 2]}}"#).unwrap();

        let value = read_json_value(file.path()).unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));
    }

    #[test]
    fn test_read_empty_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = read_json_value(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "SCANMERGE_CLI_IO_ERROR");
    }

    #[test]
    fn test_write_json_line() {
        let mut out = Vec::new();
        write_json_line(&mut out, &json!({"x": 1})).unwrap();
        write_json_line(&mut out, &json!({"x": 2})).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"x\":1}\n{\"x\":2}\n");
    }
}
