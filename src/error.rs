//! Error types for Basalt
//!
//! Defines a unified error type that can represent failures from every
//! component: durable storage refusals, malformed log lines, and internal
//! consistency violations surfaced during recovery.

use std::fmt;
use std::io;

use crate::types::{Lsn, PageId, TxnId};

/// Unified error type for Basalt operations
#[derive(Debug)]
pub enum BasaltError {
    /// I/O error (durable log file, master record file)
    Io(io::Error),
    /// A log line failed to decode, or a record failed to encode
    Encoding(String),
    /// The storage collaborator refused a durable append or page write
    Storage(String),
    /// Recovery cannot proceed (failed redo, broken checkpoint chain)
    Recovery(String),
    /// Transaction-related error (unknown or already-finished transaction)
    Transaction(String),
    /// Internal consistency violation (corrupted log or engine bug)
    Internal(String),
}

impl BasaltError {
    /// A `prev_lsn`/`undo_next_lsn` chase missed the in-memory log index.
    /// Never a recoverable condition: the log is corrupt or the engine
    /// bookkeeping is wrong.
    pub fn lsn_not_found(lsn: Lsn) -> Self {
        BasaltError::Internal(format!("LSN {} not present in the log index", lsn))
    }

    /// An operation referenced a transaction the manager does not know.
    pub fn unknown_transaction(tx: TxnId) -> Self {
        BasaltError::Transaction(format!("Transaction {} is not active", tx))
    }

    /// The storage collaborator returned `false` from a page write.
    pub fn page_write_refused(page: PageId, lsn: Lsn) -> Self {
        BasaltError::Storage(format!(
            "Page write refused for page {} at LSN {}",
            page, lsn
        ))
    }
}

impl fmt::Display for BasaltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasaltError::Io(e) => write!(f, "{}", e),
            BasaltError::Encoding(msg) => write!(f, "{}", msg),
            BasaltError::Storage(msg) => write!(f, "{}", msg),
            BasaltError::Recovery(msg) => write!(f, "{}", msg),
            BasaltError::Transaction(msg) => write!(f, "{}", msg),
            BasaltError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BasaltError {}

impl From<io::Error> for BasaltError {
    fn from(e: io::Error) -> Self {
        BasaltError::Io(e)
    }
}

impl From<serde_json::Error> for BasaltError {
    fn from(e: serde_json::Error) -> Self {
        BasaltError::Encoding(e.to_string())
    }
}

/// Result type alias for Basalt operations
pub type Result<T> = std::result::Result<T, BasaltError>;
