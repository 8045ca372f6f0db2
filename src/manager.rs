//! The log manager: normal-operation logging surface
//!
//! `LogManager` owns the log tail, the transaction table, and the dirty
//! page table for the lifetime of the process (or until recovery rebuilds
//! them). Client transactions call `write`/`commit`/`abort`, the storage
//! engine calls `checkpoint` and `page_flushed`, and the recovery entry
//! point lives in [`crate::recovery`].
//!
//! ## Concurrency Model
//!
//! Every call mutates shared state (tail + both tables) and must run as a
//! single critical section: LSN assignment order is the correctness
//! invariant the whole recovery protocol depends on. All methods take
//! `&mut self`; callers share the manager behind one mutex rather than
//! attempting fine-grained locking.

use log::{debug, info};

use crate::error::{BasaltError, Result};
use crate::record::{LogPayload, LogRecord};
use crate::storage::PageStore;
use crate::tables::{DirtyPageTable, TxStatus, TxTable};
use crate::tail::LogTail;
use crate::types::{Lsn, PageId, TxnId};

/// The ARIES log manager
pub struct LogManager<S: PageStore> {
    pub(crate) store: S,
    pub(crate) tail: LogTail,
    pub(crate) tx_table: TxTable,
    pub(crate) dirty_pages: DirtyPageTable,
}

impl<S: PageStore> LogManager<S> {
    /// Create a manager over a storage collaborator, with empty tables.
    pub fn new(store: S) -> Self {
        Self {
            store,
            tail: LogTail::new(),
            tx_table: TxTable::new(),
            dirty_pages: DirtyPageTable::new(),
        }
    }

    /// The transaction table (all transactions with recovery work left).
    pub fn tx_table(&self) -> &TxTable {
        &self.tx_table
    }

    /// The dirty page table.
    pub fn dirty_pages(&self) -> &DirtyPageTable {
        &self.dirty_pages
    }

    /// The unflushed log tail.
    pub fn tail(&self) -> &LogTail {
        &self.tail
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Tear down the manager and hand the storage collaborator back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Log an update: allocate the next LSN, chain the record to the
    /// transaction's history, and register the page as dirty. Returns the
    /// new LSN so the storage engine can stamp the page with it.
    pub fn write(
        &mut self,
        tx: TxnId,
        page: PageId,
        offset: usize,
        new_content: &str,
        old_content: &str,
    ) -> Lsn {
        let lsn = self.store.next_lsn();
        let prev_lsn = self.tx_table.last_lsn(tx);

        self.tail.append(LogRecord {
            lsn,
            prev_lsn,
            tx_id: Some(tx),
            payload: LogPayload::Update {
                page_id: page,
                offset,
                before: old_content.to_string(),
                after: new_content.to_string(),
            },
        });
        self.tx_table.touch(tx, lsn, TxStatus::Undergoing);
        self.dirty_pages.mark_dirty(page, lsn);

        debug!("tx {} logged update to page {} at LSN {}", tx, page, lsn);
        lsn
    }

    /// Commit a transaction. The COMMIT record is forced durable before
    /// this returns; the trailing END record stays in the tail.
    pub fn commit(&mut self, tx: TxnId) -> Result<()> {
        let prev_lsn = self.tx_table.last_lsn(tx);
        let commit_lsn = self.store.next_lsn();

        self.tail.append(LogRecord {
            lsn: commit_lsn,
            prev_lsn,
            tx_id: Some(tx),
            payload: LogPayload::Commit,
        });
        self.flush_through(commit_lsn)?;
        self.tx_table.remove(tx);

        let end_lsn = self.store.next_lsn();
        self.tail.append(LogRecord {
            lsn: end_lsn,
            prev_lsn: Some(commit_lsn),
            tx_id: Some(tx),
            payload: LogPayload::End,
        });

        debug!("tx {} committed at LSN {}", tx, commit_lsn);
        Ok(())
    }

    /// Abort a transaction: force an ABORT record durable, then roll the
    /// transaction back through its undo chain.
    pub fn abort(&mut self, tx: TxnId) -> Result<()> {
        if !self.tx_table.contains(tx) {
            return Err(BasaltError::unknown_transaction(tx));
        }
        let prev_lsn = self.tx_table.last_lsn(tx);
        let abort_lsn = self.store.next_lsn();

        self.tail.append(LogRecord {
            lsn: abort_lsn,
            prev_lsn,
            tx_id: Some(tx),
            payload: LogPayload::Abort,
        });
        self.tx_table.touch(tx, abort_lsn, TxStatus::Undergoing);
        self.flush_through(abort_lsn)?;

        info!("tx {} aborting from LSN {}", tx, abort_lsn);
        self.undo_single(tx, abort_lsn)
    }

    /// Take a checkpoint: BEGIN/END pair with a snapshot of both tables,
    /// forced durable, then the master record is pointed at the BEGIN.
    /// Returns the BEGIN_CHECKPOINT LSN.
    pub fn checkpoint(&mut self) -> Result<Lsn> {
        let begin_lsn = self.store.next_lsn();
        self.tail.append(LogRecord {
            lsn: begin_lsn,
            prev_lsn: None,
            tx_id: None,
            payload: LogPayload::BeginCheckpoint,
        });

        let end_lsn = self.store.next_lsn();
        self.tail.append(LogRecord {
            lsn: end_lsn,
            prev_lsn: None,
            tx_id: None,
            payload: LogPayload::EndCheckpoint {
                tx_table: self.tx_table.clone(),
                dirty_pages: self.dirty_pages.clone(),
            },
        });

        self.flush_through(end_lsn)?;
        self.store.store_master(begin_lsn)?;

        info!(
            "checkpoint complete at LSN {} ({} active txns, {} dirty pages)",
            begin_lsn,
            self.tx_table.len(),
            self.dirty_pages.len()
        );
        Ok(begin_lsn)
    }

    /// Write-ahead enforcement hook, called by the storage engine
    /// immediately before it persists a page: every log record describing
    /// a write to the page must reach durable media first. Drops the
    /// page's dirty-page entry once the log is forced.
    pub fn page_flushed(&mut self, page: PageId) -> Result<()> {
        if let Some(page_lsn) = self.store.page_lsn(page) {
            self.flush_through(page_lsn)?;
        }
        self.dirty_pages.flushed(page);
        debug!("page {} flushed, dirty entry dropped", page);
        Ok(())
    }

    /// Force every tail record with LSN <= `max_lsn` to durable storage,
    /// strictly in LSN order, never skipping a record. Each record leaves
    /// the tail only after its durable append succeeds.
    pub fn flush_through(&mut self, max_lsn: Lsn) -> Result<()> {
        while let Some(front) = self.tail.front() {
            if front.lsn > max_lsn {
                break;
            }
            let line = front.encode()?;
            self.store.append_log(&line)?;
            self.tail.pop_front();
        }
        Ok(())
    }

    /// Force the entire tail durable.
    pub(crate) fn flush_all(&mut self) -> Result<()> {
        if let Some(last) = self.tail.last_lsn() {
            self.flush_through(last)?;
        }
        Ok(())
    }
}
