//! # Basalt
//!
//! A write-ahead-log manager implementing the ARIES crash-recovery
//! algorithm for a page-oriented storage engine. After a crash, the
//! database reaches a state equivalent to having committed every
//! transaction that completed beforehand and undone every effect of those
//! that did not, using only the durable log plus the (possibly
//! inconsistent) page store.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐   write/commit/abort   ┌──────────────────────┐
//! │ Transaction layer├───────────────────────▶│      LogManager      │
//! └──────────────────┘                        │  ┌────────────────┐  │
//!                                             │  │    Log Tail    │  │
//! ┌──────────────────┐  checkpoint /          │  ├────────────────┤  │
//! │  Storage engine  ├───page_flushed────────▶│  │    Tx Table    │  │
//! │   (PageStore)    │◀──append_log/──────────┤  ├────────────────┤  │
//! └──────────────────┘   page_write           │  │ Dirty Page Tbl │  │
//!                                             │  └────────────────┘  │
//!                                             └──────────────────────┘
//! ```
//!
//! Client transactions log updates, commits, and aborts through the
//! manager; the storage engine calls back before flushing a page so the
//! write-ahead rule holds, and supplies the primitives behind the
//! [`PageStore`] trait. On restart, [`LogManager::recover`] reconstructs
//! the tables from the durable log (analysis), reapplies missing updates
//! (redo), then rolls back incomplete transactions (undo).

pub mod error;
pub mod record;
pub mod manager;
pub mod recovery;
pub mod storage;
pub mod tables;
pub mod tail;
pub mod types;

pub use error::{BasaltError, Result};
pub use record::{LogPayload, LogRecord};
pub use manager::LogManager;
pub use storage::{FileStore, MemStore, PageStore};
pub use tables::{DirtyPageTable, TxEntry, TxStatus, TxTable};
pub use tail::LogTail;
pub use types::{Lsn, PageId, TxnId};

/// Current version of Basalt
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
