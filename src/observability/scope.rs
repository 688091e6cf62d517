//! ObservationScope for automatic begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` or `{name}_FAILED` when finished explicitly
//! - Logs `{name}_INCOMPLETE` on drop otherwise

use std::cell::Cell;

use super::logger::Logger;

/// A scope that logs the start and end of a unit of work
pub struct ObservationScope<'a> {
    logger: &'a Logger,
    name: &'a str,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
}

impl<'a> ObservationScope<'a> {
    /// Create a new observation scope with identifying fields.
    ///
    /// The fields are repeated on every event the scope logs.
    pub fn with_fields(logger: &'a Logger, name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        let scope = Self {
            logger,
            name,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        };
        logger.info(&format!("{}_BEGIN", name), &scope.field_refs());
        scope
    }

    /// Create a new observation scope
    pub fn new(logger: &'a Logger, name: &'a str) -> Self {
        Self::with_fields(logger, name, &[])
    }

    fn field_refs(&self) -> Vec<(&str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    /// Mark the scope as successfully completed with additional fields
    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.completed.set(true);
        let mut all_fields = self.field_refs();
        all_fields.extend(extra_fields.iter().copied());
        self.logger
            .info(&format!("{}_COMPLETE", self.name), &all_fields);
    }

    /// Mark the scope as successfully completed
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Mark the scope as failed
    pub fn fail(self, reason: &str) {
        self.completed.set(true);
        let mut all_fields = self.field_refs();
        all_fields.push(("reason", reason));
        self.logger
            .error(&format!("{}_FAILED", self.name), &all_fields);
    }

    /// Check if the scope has been completed
    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            let mut all_fields = self.field_refs();
            all_fields.push(("reason", "scope dropped without completion"));
            self.logger
                .warn(&format!("{}_INCOMPLETE", self.name), &all_fields);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_begin_and_complete() {
        let (logger, buffer) = Logger::capture();
        let scope = ObservationScope::with_fields(&logger, "MERGE", &[("query_id", "q1")]);
        assert!(!scope.is_completed());
        scope.complete_with_fields(&[("strategy", "PASS_THROUGH")]);

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("MERGE_BEGIN"));
        assert!(lines[1].contains("MERGE_COMPLETE"));
        assert!(lines[1].contains("q1"));
        assert!(lines[1].contains("PASS_THROUGH"));
    }

    #[test]
    fn test_scope_fail() {
        let (logger, buffer) = Logger::capture();
        ObservationScope::new(&logger, "MERGE").fail("limit too large");

        let last = buffer.lines().pop().unwrap();
        assert!(last.contains("MERGE_FAILED"));
        assert!(last.contains("ERROR"));
        assert!(last.contains("limit too large"));
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let (logger, buffer) = Logger::capture();
        drop(ObservationScope::new(&logger, "MERGE"));

        let last = buffer.lines().pop().unwrap();
        assert!(last.contains("MERGE_INCOMPLETE"));
        assert!(last.contains("WARN"));
    }
}
