//! WAL log record structures and the line-oriented wire encoding
//!
//! ## Record Format
//!
//! The durable log is a sequence of records, one JSON object per line
//! (JSONL). Every line decodes back to an equivalent record, and
//! re-encoding a decoded record reproduces the line byte-for-byte - the
//! recovery phases depend on the encoding being reversible, not on its
//! exact syntax.
//!
//! ```text
//! {"lsn":1,"prev_lsn":null,"tx_id":1,"payload":{"Update":{...}}}
//! {"lsn":2,"prev_lsn":1,"tx_id":1,"payload":"Commit"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tables::{DirtyPageTable, TxTable};
use crate::types::{Lsn, PageId, TxnId};

/// A WAL log record. Immutable once created; a transaction's records form
/// a singly linked chain via `prev_lsn`, terminating at `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Log sequence number
    pub lsn: Lsn,
    /// LSN of the previous record for the same transaction
    pub prev_lsn: Option<Lsn>,
    /// Owning transaction; `None` for checkpoint markers
    pub tx_id: Option<TxnId>,
    /// The logged event
    pub payload: LogPayload,
}

/// Events that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogPayload {
    /// A page modification, with both images for redo and undo
    Update {
        page_id: PageId,
        offset: usize,
        before: String,
        after: String,
    },
    /// Compensation log record (CLR): one undo step. `undo_next_lsn` is
    /// where undo resumes for this transaction, `None` once the chain is
    /// exhausted. CLRs are never themselves undone.
    Compensation {
        page_id: PageId,
        offset: usize,
        undo_content: String,
        undo_next_lsn: Option<Lsn>,
    },
    /// Transaction committed
    Commit,
    /// Transaction abort started
    Abort,
    /// Transaction fully finished (commit completed or undo exhausted)
    End,
    /// Checkpoint started
    BeginCheckpoint,
    /// Checkpoint finished, carrying a snapshot of both tables
    EndCheckpoint {
        tx_table: TxTable,
        dirty_pages: DirtyPageTable,
    },
}

impl LogRecord {
    /// Encode this record as one log line (no trailing newline).
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one log line. Any failure is fatal to the caller; there is
    /// no partial-record recovery.
    pub fn decode(line: &str) -> Result<LogRecord> {
        Ok(serde_json::from_str(line)?)
    }

    /// The page this record touches, if it carries a page image.
    pub fn page_id(&self) -> Option<PageId> {
        match &self.payload {
            LogPayload::Update { page_id, .. } => Some(*page_id),
            LogPayload::Compensation { page_id, .. } => Some(*page_id),
            _ => None,
        }
    }

    /// Short name for log output.
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            LogPayload::Update { .. } => "UPDATE",
            LogPayload::Compensation { .. } => "COMPENSATION",
            LogPayload::Commit => "COMMIT",
            LogPayload::Abort => "ABORT",
            LogPayload::End => "END",
            LogPayload::BeginCheckpoint => "BEGIN_CHECKPOINT",
            LogPayload::EndCheckpoint { .. } => "END_CHECKPOINT",
        }
    }
}

/// Decode an entire durable log (one record per line, empty lines
/// ignored) into an LSN-ordered sequence. Decoded once per recovery
/// invocation; the phases then work off the in-memory records.
pub fn decode_log(text: &str) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        records.push(LogRecord::decode(line)?);
    }
    Ok(records)
}
