//! End-to-end recovery scenarios over an in-memory page store
//!
//! Each test runs a workload against a `LogManager`, simulates a crash by
//! discarding the in-memory state while keeping the durable facts (log,
//! master record, pages, LSN counter), then recovers and checks the
//! durable log and page contents.

use basalt::{LogManager, LogPayload, MemStore, PageStore};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Crash: keep durable state, lose the tail and both tables.
fn crash(mgr: LogManager<MemStore>) -> LogManager<MemStore> {
    LogManager::new(mgr.into_store())
}

fn record_kinds(mgr: &LogManager<MemStore>) -> Vec<&'static str> {
    let log = mgr.store().get_log().unwrap();
    basalt::record::decode_log(&log)
        .unwrap()
        .iter()
        .map(|r| r.kind())
        .collect()
}

#[test]
fn checkpoint_then_crash_before_commit_rolls_back() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());

    // T1 writes page 1 at offset 0 but never commits; a checkpoint lands
    // in between.
    mgr.write(1, 1, 0, "BBB", "AAA");
    mgr.checkpoint().unwrap();

    let mut mgr = crash(mgr);
    let log = mgr.store().get_log().unwrap();
    mgr.recover(&log).unwrap();

    assert_eq!(
        record_kinds(&mgr),
        vec![
            "UPDATE",
            "BEGIN_CHECKPOINT",
            "END_CHECKPOINT",
            "COMPENSATION",
            "END",
        ]
    );
    assert_eq!(mgr.store().page_content(1).unwrap(), "AAA");
    assert!(mgr.tx_table().is_empty());
}

#[test]
fn committed_transaction_is_redone_after_crash() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());

    // The page starts out holding "X" with a stale LSN.
    assert!(mgr.store_mut().page_write(1, 0, "X", 0));

    mgr.write(1, 1, 0, "Y", "X");
    mgr.commit(1).unwrap();
    // Crash before the storage engine physically rewrites the page: it
    // still shows "X".
    assert_eq!(mgr.store().page_content(1).unwrap(), "X");

    let mut mgr = crash(mgr);
    let log = mgr.store().get_log().unwrap();
    mgr.recover(&log).unwrap();

    assert_eq!(mgr.store().page_content(1).unwrap(), "Y");
    assert!(!mgr.tx_table().contains(1));
}

#[test]
fn explicit_abort_restores_both_pages() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());

    // T2 touches two pages; the storage engine applies each update.
    let a = mgr.write(2, 1, 0, "new-P", "old-P");
    assert!(mgr.store_mut().page_write(1, 0, "new-P", a));
    let b = mgr.write(2, 2, 0, "new-Q", "old-Q");
    assert!(mgr.store_mut().page_write(2, 0, "new-Q", b));

    mgr.abort(2).unwrap();

    assert_eq!(mgr.store().page_content(1).unwrap(), "old-P");
    assert_eq!(mgr.store().page_content(2).unwrap(), "old-Q");
    assert!(!mgr.tx_table().contains(2));
}

#[test]
fn finished_transactions_leave_no_table_entries() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());

    let a = mgr.write(1, 1, 0, "B", "A");
    assert!(mgr.store_mut().page_write(1, 0, "B", a));
    mgr.commit(1).unwrap();

    let b = mgr.write(2, 2, 0, "D", "C");
    assert!(mgr.store_mut().page_write(2, 0, "D", b));
    mgr.abort(2).unwrap();

    assert!(mgr.tx_table().is_empty());

    // Storage confirms both pages flushed; their dirty entries go away.
    mgr.page_flushed(1).unwrap();
    mgr.page_flushed(2).unwrap();
    assert!(mgr.dirty_pages().is_empty());
}

#[test]
fn lsns_are_strictly_increasing_across_operations() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());

    mgr.write(1, 1, 0, "B", "A");
    mgr.write(2, 2, 0, "D", "C");
    mgr.checkpoint().unwrap();
    mgr.write(1, 1, 4, "F", "E");
    mgr.commit(1).unwrap();
    mgr.abort(2).unwrap();
    mgr.flush_through(u64::MAX).unwrap();

    let log = mgr.store().get_log().unwrap();
    let records = basalt::record::decode_log(&log).unwrap();
    for pair in records.windows(2) {
        assert!(
            pair[0].lsn < pair[1].lsn,
            "LSN {} not before {}",
            pair[0].lsn,
            pair[1].lsn
        );
    }
}

#[test]
fn undo_of_n_updates_yields_n_compensations_and_one_end() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());

    let n = 5;
    for i in 0..n {
        let lsn = mgr.write(7, 1, i * 3, "zzz", "yyy");
        assert!(mgr.store_mut().page_write(1, i * 3, "zzz", lsn));
    }
    mgr.abort(7).unwrap();
    mgr.flush_through(u64::MAX).unwrap();

    let log = mgr.store().get_log().unwrap();
    let records = basalt::record::decode_log(&log).unwrap();
    let clrs = records
        .iter()
        .filter(|r| matches!(r.payload, LogPayload::Compensation { .. }))
        .count();
    let ends = records
        .iter()
        .filter(|r| matches!(r.payload, LogPayload::End))
        .count();
    assert_eq!(clrs, n);
    assert_eq!(ends, 1);
    assert!(!mgr.tx_table().contains(7));
    assert_eq!(mgr.store().page_content(1).unwrap(), "yyyyyyyyyyyyyyy");
}

#[test]
fn redo_is_idempotent_over_same_log_and_pages() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());
    mgr.write(1, 1, 0, "BBB", "AAA");
    mgr.write(2, 2, 0, "DDD", "CCC");
    mgr.commit(1).unwrap();
    mgr.commit(2).unwrap();

    let mut mgr = crash(mgr);
    let log = mgr.store().get_log().unwrap();
    mgr.recover(&log).unwrap();
    let pages_after_first = (
        mgr.store().page_content(1),
        mgr.store().page_content(2),
    );
    let log_after_first = mgr.store().get_log().unwrap();

    // A second crash immediately after: everything is already applied,
    // so the second recovery changes nothing observable.
    let mut mgr = crash(mgr);
    let log = mgr.store().get_log().unwrap();
    mgr.recover(&log).unwrap();

    assert_eq!(mgr.store().get_log().unwrap(), log_after_first);
    assert_eq!(
        (mgr.store().page_content(1), mgr.store().page_content(2)),
        pages_after_first
    );
}

#[test]
fn recovery_resumes_after_crash_during_undo() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());

    let u1 = mgr.write(3, 1, 0, "N1", "o1");
    assert!(mgr.store_mut().page_write(1, 0, "N1", u1));
    let u2 = mgr.write(3, 1, 2, "N2", "o2");
    assert!(mgr.store_mut().page_write(1, 2, "N2", u2));
    mgr.flush_through(u64::MAX).unwrap();

    // First recovery crashes after flushing only part of its work; model
    // the worst case where no CLR reached the durable log.
    let mut mgr = crash(mgr);
    let log = mgr.store().get_log().unwrap();
    mgr.recover(&log).unwrap();

    // Run recovery once more over the post-recovery log; the CLR chain
    // makes the second pass skip the already-undone updates.
    let mut mgr = crash(mgr);
    let log = mgr.store().get_log().unwrap();
    mgr.recover(&log).unwrap();

    assert_eq!(mgr.store().page_content(1).unwrap(), "o1o2");
    assert!(mgr.tx_table().is_empty());
}

#[test]
fn checkpoint_after_page_flush_narrows_redo() {
    init_logging();
    let mut mgr = LogManager::new(MemStore::new());

    let a = mgr.write(1, 1, 0, "B", "A");
    assert!(mgr.store_mut().page_write(1, 0, "B", a));
    mgr.page_flushed(1).unwrap();
    mgr.commit(1).unwrap();
    mgr.checkpoint().unwrap();

    let mut mgr = crash(mgr);
    let log = mgr.store().get_log().unwrap();
    mgr.recover(&log).unwrap();

    // Page 1 was clean at checkpoint time, nothing to redo or undo.
    assert_eq!(mgr.store().page_content(1).unwrap(), "B");
    assert!(mgr.tx_table().is_empty());
    assert!(mgr.dirty_pages().is_empty());
}
