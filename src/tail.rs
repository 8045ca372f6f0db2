//! The log tail: in-memory buffer of records not yet forced durable
//!
//! Records are appended at the back in creation order, and creation order
//! is LSN order, so the tail is LSN-ascending by construction. Flushing
//! removes records from the front, so the tail always holds a contiguous
//! suffix of the log: everything before it is durable, nothing in it is.

use std::collections::VecDeque;

use crate::record::LogRecord;
use crate::types::Lsn;

/// Ordered buffer of unflushed log records
#[derive(Debug, Default)]
pub struct LogTail {
    records: VecDeque<LogRecord>,
}

impl LogTail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly created record. Callers append in LSN-assignment
    /// order, which keeps the buffer sorted.
    pub fn append(&mut self, record: LogRecord) {
        debug_assert!(
            self.records.back().map_or(true, |r| r.lsn < record.lsn),
            "log tail appends must be LSN-ascending"
        );
        self.records.push_back(record);
    }

    /// LSN of the oldest unflushed record.
    pub fn front_lsn(&self) -> Option<Lsn> {
        self.records.front().map(|r| r.lsn)
    }

    /// The oldest unflushed record, left in place.
    pub fn front(&self) -> Option<&LogRecord> {
        self.records.front()
    }

    /// Remove and return the oldest record, once it is durable.
    pub fn pop_front(&mut self) -> Option<LogRecord> {
        self.records.pop_front()
    }

    /// Unflushed records in LSN order.
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// LSN of the newest record in the tail.
    pub fn last_lsn(&self) -> Option<Lsn> {
        self.records.back().map(|r| r.lsn)
    }
}
