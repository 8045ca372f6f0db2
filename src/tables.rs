//! In-memory recovery state: the transaction table and dirty page table
//!
//! Both tables are exclusively owned by the log manager. They are ordinary
//! value types so a checkpoint can snapshot them into an END_CHECKPOINT
//! record, and analysis can seed fresh copies from such a snapshot.
//! `BTreeMap` keeps the snapshot encoding deterministic, which the wire
//! round-trip contract requires.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Lsn, PageId, TxnId};

/// Recovery status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Still running, or known to need undo
    Undergoing,
    /// COMMIT record seen, END not yet produced
    Committed,
}

/// One transaction table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEntry {
    /// LSN of the most recent record for this transaction
    pub last_lsn: Lsn,
    /// Current recovery status
    pub status: TxStatus,
}

/// Transaction table: every transaction with remaining recovery work.
/// Entries appear on a transaction's first logged record and disappear
/// when an END record is produced for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxTable {
    entries: BTreeMap<TxnId, TxEntry>,
}

impl TxTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new log record for `tx`: insert the entry if unseen,
    /// then advance `last_lsn` and overwrite the status.
    pub fn touch(&mut self, tx: TxnId, lsn: Lsn, status: TxStatus) {
        self.entries.insert(tx, TxEntry { last_lsn: lsn, status });
    }

    /// LSN of the most recent record for `tx`, or `None` if unseen.
    pub fn last_lsn(&self, tx: TxnId) -> Option<Lsn> {
        self.entries.get(&tx).map(|e| e.last_lsn)
    }

    pub fn get(&self, tx: TxnId) -> Option<&TxEntry> {
        self.entries.get(&tx)
    }

    pub fn remove(&mut self, tx: TxnId) -> Option<TxEntry> {
        self.entries.remove(&tx)
    }

    pub fn contains(&self, tx: TxnId) -> bool {
        self.entries.contains_key(&tx)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TxnId, &TxEntry)> {
        self.entries.iter().map(|(tx, e)| (*tx, e))
    }
}

/// Dirty page table: page id -> `rec_lsn`, the LSN of the first record
/// that dirtied the page since its last durable flush. The lower bound
/// for redo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirtyPageTable {
    pages: BTreeMap<PageId, Lsn>,
}

impl DirtyPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `page` as dirtied at `lsn`. The first-dirtying LSN is
    /// never moved later: repeated calls keep the earliest value.
    pub fn mark_dirty(&mut self, page: PageId, lsn: Lsn) {
        self.pages.entry(page).or_insert(lsn);
    }

    /// The `rec_lsn` for `page`, or `None` if the page is clean.
    pub fn rec_lsn(&self, page: PageId) -> Option<Lsn> {
        self.pages.get(&page).copied()
    }

    /// Drop the entry for `page` (storage reported it durably flushed).
    pub fn flushed(&mut self, page: PageId) -> Option<Lsn> {
        self.pages.remove(&page)
    }

    /// The earliest point any page could be under-durable; the redo scan
    /// starts here. `None` means redo has nothing to do.
    pub fn min_rec_lsn(&self) -> Option<Lsn> {
        self.pages.values().copied().min()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }
}
