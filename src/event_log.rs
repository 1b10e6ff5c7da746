//! # Event Log Module
//!
//! Time-ordered record of human-readable session events. This is the only
//! place the core's history can be observed from.
//!
//! ## Key Components
//! - `EventLog`: Writer half, owned by the session core
//! - `LogView`: Cloneable read-only handle for presentation code
//! - `LogEntry`: Immutable (sequence, timestamp, message) record
//!
//! ## Retention
//! The log keeps at most `capacity` entries. When full, the oldest entry is
//! evicted. Sequence numbers keep counting across evictions, so readers can
//! tell that history was dropped and order is never ambiguous even when two
//! callbacks land within the same clock tick.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.message
        )
    }
}

type SharedEntries = Arc<RwLock<VecDeque<LogEntry>>>;

pub struct EventLog {
    entries: SharedEntries,
    capacity: usize,
    next_seq: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
            next_seq: 0,
        }
    }

    /// Stamps `message` with the current time and adds it at the tail
    pub fn append(&mut self, message: impl Into<String>) {
        let entry = LogEntry {
            seq: self.next_seq,
            timestamp: Local::now(),
            message: message.into(),
        };
        self.next_seq += 1;
        log::info!("{}", entry.message);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Total appends, including evicted entries
    pub fn revision(&self) -> u64 {
        self.next_seq
    }

    pub fn view(&self) -> LogView {
        LogView {
            entries: Arc::clone(&self.entries),
        }
    }

    pub fn len(&self) -> usize {
        self.view().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only access to the Event Log
#[derive(Clone)]
pub struct LogView {
    entries: SharedEntries,
}

impl LogView {
    /// Entries in the order they were appended
    pub fn entries(&self) -> Vec<LogEntry> {
        self.read(|entries| entries.iter().cloned().collect())
    }

    /// Entries newest first, the way a log screen shows them
    pub fn newest_first(&self) -> Vec<LogEntry> {
        self.read(|entries| entries.iter().rev().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<LogEntry> {
        self.read(|entries| entries.back().cloned())
    }

    /// True if any retained entry's message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.read(|entries| entries.iter().any(|e| e.message.contains(needle)))
    }

    fn read<T>(&self, f: impl FnOnce(&VecDeque<LogEntry>) -> T) -> T {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        f(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut log = EventLog::new(10);
        log.append("first");
        log.append("second");
        log.append("third");

        let messages: Vec<_> = log.view().entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_sequence_numbers_are_strictly_increasing() {
        let mut log = EventLog::new(100);
        for i in 0..50 {
            log.append(format!("event {}", i));
        }
        let entries = log.view().entries();
        assert!(entries.windows(2).all(|w| w[0].seq < w[1].seq));
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_newest_first() {
        let mut log = EventLog::new(10);
        log.append("old");
        log.append("new");
        let view = log.view();
        assert_eq!(view.newest_first()[0].message, "new");
        assert_eq!(view.last().map(|e| e.message), Some("new".to_string()));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = EventLog::new(2);
        log.append("a");
        log.append("b");
        log.append("c");

        let entries = log.view().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "b");
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[1].seq, 2);
    }

    #[test]
    fn test_view_sees_later_appends() {
        let mut log = EventLog::new(10);
        let view = log.view();
        assert!(view.is_empty());
        log.append("Started scanning");
        assert!(view.contains("Started"));
    }

    #[test]
    fn test_display_includes_message() {
        let mut log = EventLog::new(1);
        log.append("Stopped scanning");
        let rendered = log.view().entries()[0].to_string();
        assert!(rendered.ends_with(": Stopped scanning"));
    }
}
