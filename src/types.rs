//! Core identifier types shared across the WAL manager

/// Log Sequence Number - unique identifier for each WAL record,
/// assigned in strictly increasing creation order
pub type Lsn = u64;

/// Transaction ID
pub type TxnId = u64;

/// Page ID in the collaborating page store
pub type PageId = u64;
