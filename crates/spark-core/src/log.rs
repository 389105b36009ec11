//! Structured error reporting for absorbed faults.
//!
//! Listener failures and best-effort side effects never propagate to callers.
//! They are handed to an [`ErrorLog`] instead; production code forwards them
//! to `tracing`, tests swap in a recorder.

use std::fmt;
use std::sync::{Arc, Mutex};

/// One absorbed fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Component that caught the fault (e.g. "AgentEventBus").
    pub service: &'static str,
    /// Operation in progress (e.g. "emit").
    pub operation: &'static str,
    pub message: String,
    pub error: Option<String>,
}

impl LogRecord {
    pub fn new(service: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            operation,
            message: message.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Sink for faults that are caught and swallowed.
pub trait ErrorLog: Send + Sync {
    fn error(&self, record: &LogRecord);
}

/// Forwards records to `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorLog;

impl ErrorLog for TracingErrorLog {
    fn error(&self, record: &LogRecord) {
        tracing::error!(
            service = record.service,
            operation = record.operation,
            error = record.error.as_deref().unwrap_or(""),
            "{}",
            record.message
        );
    }
}

/// Keeps every record in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RecordingErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorLog for RecordingErrorLog {
    fn error(&self, record: &LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Shared handle used by components that report faults.
pub type SharedErrorLog = Arc<dyn ErrorLog>;

/// The default sink.
pub fn tracing_log() -> SharedErrorLog {
    Arc::new(TracingErrorLog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_log_keeps_records_in_order() {
        let log = RecordingErrorLog::new();
        let shared: SharedErrorLog = Arc::new(log.clone());
        shared.error(&LogRecord::new("A", "one", "first"));
        shared.error(&LogRecord::new("B", "two", "second").with_error("boom"));

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "first");
        assert_eq!(records[1].error.as_deref(), Some("boom"));
    }
}
