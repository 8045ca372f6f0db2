//! Storage collaborator boundary
//!
//! The log manager never touches durable media directly. It consumes the
//! [`PageStore`] contract: LSN allocation, the durable log, the master
//! record (checkpoint pointer), and physical page writes. The collaborator
//! only supplies facts; the recovery tables are owned and mutated by the
//! manager alone.
//!
//! Two implementations ship with the crate:
//! - [`MemStore`]: everything in memory, with fault injection switches for
//!   exercising the failure paths in tests.
//! - [`FileStore`]: durable log and master record on disk (append-mode
//!   `wal.log`, JSON `wal.master`), pages in memory.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::error::Result;
use crate::record::decode_log;
use crate::types::{Lsn, PageId};

/// Contract the storage engine exposes to the log manager
pub trait PageStore {
    /// Allocate the next globally unique, monotonically increasing LSN.
    fn next_lsn(&mut self) -> Lsn;

    /// The full durable log, one encoded record per line (empty if none).
    fn get_log(&self) -> Result<String>;

    /// Durably append one encoded record to the log.
    fn append_log(&mut self, line: &str) -> Result<()>;

    /// Persist the checkpoint pointer.
    fn store_master(&mut self, lsn: Lsn) -> Result<()>;

    /// The persisted checkpoint pointer, or `None` if no checkpoint exists.
    fn get_master(&self) -> Option<Lsn>;

    /// Current on-disk LSN stamped on a page (`None` if never written).
    fn page_lsn(&self, page: PageId) -> Option<Lsn>;

    /// Physically write `image` at `offset` on the given page and stamp it
    /// with `lsn`. Returns `false` if the write is refused.
    fn page_write(&mut self, page: PageId, offset: usize, image: &str, lsn: Lsn) -> bool;
}

/// A materialized page: raw content plus the LSN stamped by the last write
#[derive(Debug, Clone)]
struct PageImage {
    bytes: Vec<u8>,
    lsn: Lsn,
}

/// Overlay `image` at `offset`, padding with spaces if the page is shorter.
fn splice_image(bytes: &mut Vec<u8>, offset: usize, image: &str) {
    let end = offset + image.len();
    if bytes.len() < end {
        bytes.resize(end, b' ');
    }
    bytes[offset..end].copy_from_slice(image.as_bytes());
}

/// In-memory page store with fault injection, for tests
#[derive(Debug, Default)]
pub struct MemStore {
    log: String,
    master: Option<Lsn>,
    next_lsn: Lsn,
    pages: HashMap<PageId, PageImage>,
    fail_page_writes: bool,
    fail_log_appends: bool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `page_write` return `false`.
    pub fn set_fail_page_writes(&mut self, fail: bool) {
        self.fail_page_writes = fail;
    }

    /// Make every subsequent `append_log` fail.
    pub fn set_fail_log_appends(&mut self, fail: bool) {
        self.fail_log_appends = fail;
    }

    /// Current content of a page, for assertions.
    pub fn page_content(&self, page: PageId) -> Option<String> {
        self.pages
            .get(&page)
            .map(|p| String::from_utf8_lossy(&p.bytes).into_owned())
    }

    /// Drop a page image while keeping its log history, simulating a page
    /// write that never physically landed before a crash.
    pub fn clobber_page(&mut self, page: PageId) {
        self.pages.remove(&page);
    }
}

impl PageStore for MemStore {
    fn next_lsn(&mut self) -> Lsn {
        self.next_lsn += 1;
        self.next_lsn
    }

    fn get_log(&self) -> Result<String> {
        Ok(self.log.clone())
    }

    fn append_log(&mut self, line: &str) -> Result<()> {
        if self.fail_log_appends {
            return Err(crate::error::BasaltError::Storage(
                "durable log append refused".to_string(),
            ));
        }
        self.log.push_str(line);
        self.log.push('\n');
        Ok(())
    }

    fn store_master(&mut self, lsn: Lsn) -> Result<()> {
        self.master = Some(lsn);
        Ok(())
    }

    fn get_master(&self) -> Option<Lsn> {
        self.master
    }

    fn page_lsn(&self, page: PageId) -> Option<Lsn> {
        self.pages.get(&page).map(|p| p.lsn)
    }

    fn page_write(&mut self, page: PageId, offset: usize, image: &str, lsn: Lsn) -> bool {
        if self.fail_page_writes {
            return false;
        }
        let entry = self.pages.entry(page).or_insert(PageImage {
            bytes: Vec::new(),
            lsn: 0,
        });
        splice_image(&mut entry.bytes, offset, image);
        entry.lsn = lsn;
        true
    }
}

/// Page store with a durable log file and master record.
///
/// Layout under the data directory:
/// ```text
/// data/
/// ├── wal.log      # one encoded log record per line, append-only
/// └── wal.master   # JSON checkpoint pointer: {"lsn": 42}
/// ```
///
/// Pages live in memory; a real storage engine would supply its own
/// buffer pool behind the same trait.
#[derive(Debug)]
pub struct FileStore {
    data_dir: PathBuf,
    master: Option<Lsn>,
    next_lsn: Lsn,
    pages: HashMap<PageId, PageImage>,
}

impl FileStore {
    /// Open (or create) a store in `data_dir`. The LSN counter resumes
    /// past the highest LSN already in the durable log.
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;

        let mut store = Self {
            data_dir,
            master: None,
            next_lsn: 0,
            pages: HashMap::new(),
        };

        let log_text = store.get_log()?;
        let records = decode_log(&log_text)?;
        store.next_lsn = records.iter().map(|r| r.lsn).max().unwrap_or(0);
        store.master = store.read_master();

        Ok(store)
    }

    fn log_path(&self) -> PathBuf {
        self.data_dir.join("wal.log")
    }

    fn master_path(&self) -> PathBuf {
        self.data_dir.join("wal.master")
    }

    /// Read the master record file. Lenient: a missing or unreadable file
    /// just means no checkpoint has been taken.
    fn read_master(&self) -> Option<Lsn> {
        let path = self.master_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => return None,
        };
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => json.get("lsn").and_then(|v| v.as_u64()),
            Err(e) => {
                log::warn!("Failed to parse master record '{}': {}", path.display(), e);
                None
            }
        }
    }

    /// Current content of a page, for assertions.
    pub fn page_content(&self, page: PageId) -> Option<String> {
        self.pages
            .get(&page)
            .map(|p| String::from_utf8_lossy(&p.bytes).into_owned())
    }
}

impl PageStore for FileStore {
    fn next_lsn(&mut self) -> Lsn {
        self.next_lsn += 1;
        self.next_lsn
    }

    fn get_log(&self) -> Result<String> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(String::new());
        }
        Ok(fs::read_to_string(path)?)
    }

    fn append_log(&mut self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(file, "{}", line)?;
        file.sync_data()?;
        Ok(())
    }

    fn store_master(&mut self, lsn: Lsn) -> Result<()> {
        let marker = serde_json::json!({ "lsn": lsn });
        fs::write(self.master_path(), serde_json::to_string(&marker)?)?;
        self.master = Some(lsn);
        Ok(())
    }

    fn get_master(&self) -> Option<Lsn> {
        self.master
    }

    fn page_lsn(&self, page: PageId) -> Option<Lsn> {
        self.pages.get(&page).map(|p| p.lsn)
    }

    fn page_write(&mut self, page: PageId, offset: usize, image: &str, lsn: Lsn) -> bool {
        let entry = self.pages.entry(page).or_insert(PageImage {
            bytes: Vec::new(),
            lsn: 0,
        });
        splice_image(&mut entry.bytes, offset, image);
        entry.lsn = lsn;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_splice_image_extends_and_overlays() {
        let mut bytes = Vec::new();
        splice_image(&mut bytes, 2, "XY");
        assert_eq!(bytes, b"  XY");

        splice_image(&mut bytes, 0, "AB");
        assert_eq!(bytes, b"ABXY");
    }

    #[test]
    fn test_mem_store_lsn_allocation_is_strictly_increasing() {
        let mut store = MemStore::new();
        let a = store.next_lsn();
        let b = store.next_lsn();
        let c = store.next_lsn();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_mem_store_log_append() {
        let mut store = MemStore::new();
        store.append_log("one").unwrap();
        store.append_log("two").unwrap();
        assert_eq!(store.get_log().unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_mem_store_page_write_and_stamp() {
        let mut store = MemStore::new();
        assert_eq!(store.page_lsn(3), None);

        assert!(store.page_write(3, 0, "AAA", 5));
        assert_eq!(store.page_lsn(3), Some(5));
        assert_eq!(store.page_content(3).unwrap(), "AAA");

        assert!(store.page_write(3, 1, "ZZ", 9));
        assert_eq!(store.page_lsn(3), Some(9));
        assert_eq!(store.page_content(3).unwrap(), "AZZ");
    }

    #[test]
    fn test_mem_store_fault_injection() {
        let mut store = MemStore::new();
        store.set_fail_page_writes(true);
        assert!(!store.page_write(1, 0, "X", 1));

        store.set_fail_log_appends(true);
        assert!(store.append_log("line").is_err());
    }

    #[test]
    fn test_file_store_log_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get_log().unwrap(), "");

        store
            .append_log(r#"{"lsn":1,"prev_lsn":null,"tx_id":1,"payload":"Commit"}"#)
            .unwrap();
        let text = store.get_log().unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_file_store_master_record() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get_master(), None);

        store.store_master(17).unwrap();
        assert_eq!(store.get_master(), Some(17));

        // Survives reopen
        drop(store);
        let store = FileStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get_master(), Some(17));
    }

    #[test]
    fn test_file_store_lsn_counter_resumes_past_log() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::open(dir.path().to_path_buf()).unwrap();
        store
            .append_log(r#"{"lsn":5,"prev_lsn":null,"tx_id":1,"payload":"Commit"}"#)
            .unwrap();
        drop(store);

        let mut store = FileStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.next_lsn(), 6);
    }
}
