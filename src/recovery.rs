//! Three-phase ARIES crash recovery: analysis, redo, undo
//!
//! `recover` rebuilds the transaction and dirty page tables from the
//! durable log (analysis), reapplies every update whose effect may not
//! have reached durable page storage (redo), then rolls back the
//! transactions that never finished (undo). The phases run strictly in
//! that order and never concurrently; the whole sequence is restartable,
//! including when a previous recovery was itself interrupted mid-undo.
//!
//! The durable log is decoded exactly once per invocation into a
//! [`LogIndex`]: an arena of record values plus an LSN lookup table. Undo
//! walks chains through LSNs resolved against the index, never through
//! references into temporary collections.

use std::collections::{BinaryHeap, HashMap};

use log::{debug, info};

use crate::error::{BasaltError, Result};
use crate::record::{decode_log, LogPayload, LogRecord};
use crate::manager::LogManager;
use crate::storage::PageStore;
use crate::tables::{DirtyPageTable, TxStatus, TxTable};
use crate::tail::LogTail;
use crate::types::{Lsn, TxnId};

/// LSN-ordered arena of decoded log records with O(1) lookup by LSN
pub(crate) struct LogIndex {
    records: Vec<LogRecord>,
    by_lsn: HashMap<Lsn, usize>,
}

impl LogIndex {
    /// Build an index over records already in LSN order (decode order).
    pub(crate) fn new(records: Vec<LogRecord>) -> Self {
        let by_lsn = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.lsn, i))
            .collect();
        Self { records, by_lsn }
    }

    /// Resolve an LSN chased through a `prev_lsn`/`undo_next_lsn` chain.
    /// A miss means a corrupted log or an engine bug, never a recoverable
    /// condition.
    fn get(&self, lsn: Lsn) -> Result<&LogRecord> {
        self.by_lsn
            .get(&lsn)
            .map(|&i| &self.records[i])
            .ok_or_else(|| BasaltError::lsn_not_found(lsn))
    }

    /// Position of the record with exactly this LSN, if present.
    fn position_of(&self, lsn: Lsn) -> Option<usize> {
        self.by_lsn.get(&lsn).copied()
    }

    fn records(&self) -> &[LogRecord] {
        &self.records
    }
}

impl<S: PageStore> LogManager<S> {
    /// Recover from a crash given the durable log. Runs analysis, redo,
    /// and undo in order, then forces the records synthesized during
    /// recovery (CLRs and ENDs) durable, leaving the in-memory tables in
    /// post-recovery steady state.
    ///
    /// A redo failure surfaces as [`BasaltError::Recovery`] and undo does
    /// not run: partial redo plus skipped undo would break the durability
    /// guarantee, so the caller must restart the whole sequence rather
    /// than start an inconsistent database.
    pub fn recover(&mut self, durable_log: &str) -> Result<()> {
        info!("starting crash recovery");
        let index = LogIndex::new(decode_log(durable_log)?);
        self.tail = LogTail::new();

        self.analyze(&index)?;
        info!(
            "analysis complete: {} txns to resolve, {} dirty pages",
            self.tx_table.len(),
            self.dirty_pages.len()
        );

        self.redo(&index).map_err(|e| {
            BasaltError::Recovery(format!(
                "redo failed, recovery must be restarted from the top: {}",
                e
            ))
        })?;

        let seeds: Vec<Lsn> = self.tx_table.iter().map(|(_, e)| e.last_lsn).collect();
        self.run_undo(&index, seeds)?;

        self.flush_all()?;
        info!("recovery complete");
        Ok(())
    }

    /// Analysis phase: reconstruct both tables from the durable log,
    /// starting from the master-pointed checkpoint snapshot when one
    /// exists.
    fn analyze(&mut self, index: &LogIndex) -> Result<()> {
        self.tx_table = TxTable::new();
        self.dirty_pages = DirtyPageTable::new();

        let mut start = 0;
        if let Some(master) = self.store.get_master() {
            if let Some(pos) = index.position_of(master) {
                let end = index.records().get(pos + 1).ok_or_else(|| {
                    BasaltError::Recovery(format!(
                        "log ends before the END_CHECKPOINT paired with LSN {}",
                        master
                    ))
                })?;
                match &end.payload {
                    LogPayload::EndCheckpoint {
                        tx_table,
                        dirty_pages,
                    } => {
                        self.tx_table = tx_table.clone();
                        self.dirty_pages = dirty_pages.clone();
                        start = pos + 2;
                        debug!("analysis seeded from checkpoint at LSN {}", master);
                    }
                    other => {
                        return Err(BasaltError::Recovery(format!(
                            "master record LSN {} is not followed by END_CHECKPOINT (found {})",
                            master,
                            other_kind(other)
                        )))
                    }
                }
            }
            // Master points past the retained log: scan everything with
            // empty tables.
        }

        for record in &index.records()[start..] {
            if let Some(tx) = record.tx_id {
                if matches!(record.payload, LogPayload::End) {
                    // The transaction fully finished before the crash.
                    self.tx_table.remove(tx);
                } else {
                    let status = if matches!(record.payload, LogPayload::Commit) {
                        TxStatus::Committed
                    } else {
                        TxStatus::Undergoing
                    };
                    self.tx_table.touch(tx, record.lsn, status);
                }
            }
            if let Some(page) = record.page_id() {
                self.dirty_pages.mark_dirty(page, record.lsn);
            }
        }
        Ok(())
    }

    /// Redo phase: reapply every update or compensation whose effect may
    /// be missing from durable page storage. Idempotent: a record is
    /// skipped unless the page's on-disk LSN is strictly older.
    fn redo(&mut self, index: &LogIndex) -> Result<()> {
        let start = match self.dirty_pages.min_rec_lsn() {
            Some(lsn) => lsn,
            None => {
                debug!("no dirty pages, redo has nothing to do");
                self.finish_committed()?;
                return Ok(());
            }
        };

        for record in index.records() {
            if record.lsn < start {
                continue;
            }
            let (page, offset, image) = match &record.payload {
                LogPayload::Update {
                    page_id,
                    offset,
                    after,
                    ..
                } => (*page_id, *offset, after),
                LogPayload::Compensation {
                    page_id,
                    offset,
                    undo_content,
                    ..
                } => (*page_id, *offset, undo_content),
                _ => continue,
            };

            match self.dirty_pages.rec_lsn(page) {
                Some(rec_lsn) if rec_lsn <= record.lsn => {}
                _ => {
                    debug!("redo skip LSN {}: page {} not dirty here", record.lsn, page);
                    continue;
                }
            }
            if let Some(page_lsn) = self.store.page_lsn(page) {
                if page_lsn >= record.lsn {
                    debug!(
                        "redo skip LSN {}: page {} already at LSN {}",
                        record.lsn, page, page_lsn
                    );
                    continue;
                }
            }

            if !self.store.page_write(page, offset, image, record.lsn) {
                return Err(BasaltError::page_write_refused(page, record.lsn));
            }
            debug!("redo applied LSN {} to page {}", record.lsn, page);
        }

        self.finish_committed()
    }

    /// After a successful redo scan, transactions that committed before
    /// the crash are done: their effects are complete and they never need
    /// undo. Synthesize their END records and drop them from the table.
    fn finish_committed(&mut self) -> Result<()> {
        let committed: Vec<(TxnId, Lsn)> = self
            .tx_table
            .iter()
            .filter(|(_, e)| e.status == TxStatus::Committed)
            .map(|(tx, e)| (tx, e.last_lsn))
            .collect();

        for (tx, last_lsn) in committed {
            let end_lsn = self.store.next_lsn();
            self.tail.append(LogRecord {
                lsn: end_lsn,
                prev_lsn: Some(last_lsn),
                tx_id: Some(tx),
                payload: LogPayload::End,
            });
            self.tx_table.remove(tx);
            info!("tx {} committed before crash, END synthesized", tx);
        }
        Ok(())
    }

    /// Undo a single transaction (explicit abort path). The caller has
    /// already appended and forced the ABORT record at `last_lsn`.
    pub(crate) fn undo_single(&mut self, tx: TxnId, last_lsn: Lsn) -> Result<()> {
        // The chain may span the durable log and the unflushed tail.
        let mut records = decode_log(&self.store.get_log()?)?;
        records.extend(self.tail.iter().cloned());
        let index = LogIndex::new(records);

        debug_assert!(self.tx_table.contains(tx));
        self.run_undo(&index, vec![last_lsn])
    }

    /// Undo phase: roll back every seeded chain, processing records in
    /// strictly descending LSN order across all transactions at once so
    /// CLR chaining interleaves correctly. Terminates when every
    /// participating transaction has reached an END record.
    fn run_undo(&mut self, index: &LogIndex, seeds: Vec<Lsn>) -> Result<()> {
        let mut queue: BinaryHeap<Lsn> = seeds.into_iter().collect();

        while let Some(lsn) = queue.pop() {
            let record = index.get(lsn)?.clone();
            let tx = record.tx_id.ok_or_else(|| {
                BasaltError::Internal(format!(
                    "undo reached LSN {} ({}) with no owning transaction",
                    lsn,
                    record.kind()
                ))
            })?;

            match &record.payload {
                LogPayload::Compensation { undo_next_lsn, .. } => {
                    // This undo step already happened; resume past it.
                    match undo_next_lsn {
                        Some(next) => queue.push(*next),
                        None => self.finish_undo(tx)?,
                    }
                }
                LogPayload::Update {
                    page_id,
                    offset,
                    before,
                    ..
                } => {
                    let clr_lsn = self.store.next_lsn();
                    if !self.store.page_write(*page_id, *offset, before, clr_lsn) {
                        return Err(BasaltError::page_write_refused(*page_id, clr_lsn));
                    }

                    self.tail.append(LogRecord {
                        lsn: clr_lsn,
                        prev_lsn: self.tx_table.last_lsn(tx),
                        tx_id: Some(tx),
                        payload: LogPayload::Compensation {
                            page_id: *page_id,
                            offset: *offset,
                            undo_content: before.clone(),
                            undo_next_lsn: record.prev_lsn,
                        },
                    });
                    self.tx_table.touch(tx, clr_lsn, TxStatus::Undergoing);
                    self.dirty_pages.mark_dirty(*page_id, clr_lsn);
                    debug!(
                        "tx {} undid LSN {} with CLR at LSN {}",
                        tx, record.lsn, clr_lsn
                    );

                    match record.prev_lsn {
                        Some(prev) => queue.push(prev),
                        None => self.finish_undo(tx)?,
                    }
                }
                // COMMIT/ABORT records reached while walking a chain carry
                // nothing undoable; keep following the chain.
                _ => match record.prev_lsn {
                    Some(prev) => queue.push(prev),
                    None => self.finish_undo(tx)?,
                },
            }
        }
        Ok(())
    }

    /// A transaction's undo chain is exhausted: append its END record and
    /// drop it from the transaction table.
    fn finish_undo(&mut self, tx: TxnId) -> Result<()> {
        let last_lsn = self.tx_table.last_lsn(tx);
        let end_lsn = self.store.next_lsn();
        self.tail.append(LogRecord {
            lsn: end_lsn,
            prev_lsn: last_lsn,
            tx_id: Some(tx),
            payload: LogPayload::End,
        });
        self.tx_table.remove(tx);
        info!("tx {} fully rolled back, END at LSN {}", tx, end_lsn);
        Ok(())
    }
}

fn other_kind(payload: &LogPayload) -> &'static str {
    match payload {
        LogPayload::Update { .. } => "UPDATE",
        LogPayload::Compensation { .. } => "COMPENSATION",
        LogPayload::Commit => "COMMIT",
        LogPayload::Abort => "ABORT",
        LogPayload::End => "END",
        LogPayload::BeginCheckpoint => "BEGIN_CHECKPOINT",
        LogPayload::EndCheckpoint { .. } => "END_CHECKPOINT",
    }
}
