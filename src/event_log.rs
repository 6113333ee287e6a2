//! In-app event log
//!
//! A ring buffer of recent happenings: live-feed connects and drops,
//! malformed messages, stale references, playback failures. Rendered in
//! its own panel; independent of App so it can be tested in isolation.

use std::collections::VecDeque;
use std::time::Instant;

/// Maximum number of entries to keep in the log
const MAX_LOG_SIZE: usize = 100;

/// Severity of a log entry, used only for display styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Info,
    Warn,
    Error,
}

/// A single event log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub message: String,
    pub timestamp: Instant,
    pub kind: LogKind,
}

/// Ring buffer of log entries (newest at back). When capacity is
/// reached, oldest entries are evicted.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(message.into(), LogKind::Info);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(message.into(), LogKind::Warn);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(message.into(), LogKind::Error);
    }

    fn log(&mut self, message: String, kind: LogKind) {
        let entry = LogEntry {
            message,
            timestamp: Instant::now(),
            kind,
        };

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries in reverse chronological order (newest first)
    pub fn entries_recent_first(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
