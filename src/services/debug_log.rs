//! Session log: the user-facing audit trail shown in the debug modal.
//!
//! Entries are append-only for the lifetime of the session. Each one is also mirrored to
//! `tracing` on the `qrlens::session` target so the rotating file log carries the same trail.

use chrono::Local;
use std::fmt;
use std::sync::Mutex;

/// Suggested file name for the exported session log
pub const LOG_EXPORT_FILENAME: &str = "debug-log.log";

/// `YYYY-MM-DD HH:MM:SS`, 24-hour clock
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One immutable line of the session log
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
}

impl LogEntry {
    /// Stamp `message` with the current local time.
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp, self.message)
    }
}

/// Ordered, append-only list of [`LogEntry`] values.
#[derive(Debug, Default)]
pub struct DebugLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new entry and return a copy of it.
    pub fn record(&self, message: impl Into<String>) -> LogEntry {
        self.record_with(message, |_| {})
    }

    /// Append a new entry, running `on_append` while the log is still locked.
    ///
    /// Observers notified from `on_append` see entries in exactly the order they were stored.
    pub fn record_with<F>(&self, message: impl Into<String>, on_append: F) -> LogEntry
    where
        F: FnOnce(&LogEntry),
    {
        let entry = LogEntry::now(message);
        let mut entries = self.entries.lock().expect("session log lock poisoned");

        tracing::info!(target: "qrlens::session", "{}", entry.message);
        entries.push(entry.clone());
        on_append(&entry);

        entry
    }

    /// Copy of all entries in recorded order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .expect("session log lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("session log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if any entry's message is exactly `message`
    pub fn contains(&self, message: &str) -> bool {
        self.entries
            .lock()
            .expect("session log lock poisoned")
            .iter()
            .any(|entry| entry.message == message)
    }

    /// All rendered entries joined with `\n` (no trailing newline).
    pub fn export(&self) -> String {
        self.entries
            .lock()
            .expect("session log lock poisoned")
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
