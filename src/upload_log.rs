//! Append-only, in-memory record of upload and export outcomes.
//!
//! Served verbatim by `GET /status`.  Entries are never evicted; the log
//! lives for the process lifetime.  Every entry is also emitted as a
//! `tracing` event at the matching level.

use std::sync::Mutex;

use serde::Serialize;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A single recorded outcome.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

/// Process-wide upload log, shared through `AppState`.
#[derive(Debug, Default)]
pub struct UploadLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl UploadLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the current time.
    pub fn record(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.into(),
        };

        match level {
            LogLevel::Info => tracing::info!(target: "upload_log", "{}", entry.message),
            LogLevel::Warn => tracing::warn!(target: "upload_log", "{}", entry.message),
            LogLevel::Error => tracing::error!(target: "upload_log", "{}", entry.message),
        }

        // A poisoned lock still holds a valid vector; keep appending.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message);
    }

    /// Copy of all entries in append order.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
