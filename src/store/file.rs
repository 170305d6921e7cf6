//! JSON file-backed record store
//!
//! A `MemoryStore` whose durable state is written to disk on every commit
//! that carries writes. The file is checksummed:
//!
//! ```text
//! { "format_version": 1, "checksum": <crc32 of records JSON>, "records": [...] }
//! ```
//!
//! A checksum mismatch on open is corruption and the store refuses to load.
//! Writes go to a sibling temp file which is fsynced and renamed into place.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::observability::{log_event_with_fields, Event};

use super::errors::{StoreError, StoreResult};
use super::memory::{MemoryStore, StoreStats};
use super::record::{Query, Record, RecordRef};
use super::stream::RowStream;
use super::RecordStore;

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    format_version: u32,
    checksum: u32,
    records: Vec<Record>,
}

fn checksum_records(records: &[Record]) -> StoreResult<u32> {
    let bytes = serde_json::to_vec(records)?;
    let mut hasher = Hasher::new();
    hasher.update(&bytes);
    Ok(hasher.finalize())
}

/// Record store persisted as a single JSON document
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open an existing store file, verifying its checksum
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read(&path)?;
        let file: StoreFile = serde_json::from_slice(&content)?;

        if file.format_version != FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported format_version {} in {}",
                file.format_version,
                path.display()
            )));
        }

        let actual = checksum_records(&file.records)?;
        if actual != file.checksum {
            return Err(StoreError::Corrupt(format!(
                "checksum mismatch in {}: expected {:08x}, computed {:08x}",
                path.display(),
                file.checksum,
                actual
            )));
        }

        let shown = path.display().to_string();
        let count = file.records.len().to_string();
        log_event_with_fields(
            Event::StoreLoaded,
            &[("path", shown.as_str()), ("records", count.as_str())],
        );

        Ok(Self {
            path,
            inner: MemoryStore::with_records(file.records),
        })
    }

    /// Create a new store file holding `records`; fails if the file exists
    pub fn create(
        path: impl AsRef<Path>,
        records: impl IntoIterator<Item = Record>,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(StoreError::Write(format!(
                "store file already exists: {}",
                path.display()
            )));
        }
        let store = Self {
            path,
            inner: MemoryStore::with_records(records),
        };
        store.persist(store.inner.durable_records())?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.stats()
    }

    /// Underlying memory store, for inspection
    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Discard uncommitted writes
    pub fn rollback(&mut self) {
        self.inner.rollback();
    }

    fn persist<'a>(&self, records: impl Iterator<Item = &'a Record>) -> StoreResult<()> {
        let records: Vec<Record> = records.cloned().collect();
        let file = StoreFile {
            format_version: FORMAT_VERSION,
            checksum: checksum_records(&records)?,
            records,
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let tmp = self.path.with_extension("tmp");
        let mut out = File::create(&tmp)?;
        out.write_all(&json)?;
        out.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            OpenOptions::new().read(true).open(parent)?.sync_all()?;
        }

        let shown = self.path.display().to_string();
        let count = file.records.len().to_string();
        log_event_with_fields(
            Event::StorePersisted,
            &[("path", shown.as_str()), ("records", count.as_str())],
        );
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn query(&mut self, query: &Query) -> StoreResult<Box<dyn RowStream>> {
        self.inner.query(query)
    }

    fn fetch_by_id(&mut self, record_type: &str, id: &str) -> StoreResult<Option<Record>> {
        self.inner.fetch_by_id(record_type, id)
    }

    fn save(&mut self, record: Record) -> StoreResult<()> {
        self.inner.save(record)
    }

    fn remove(&mut self, record_type: &str, id: &str) -> StoreResult<bool> {
        self.inner.remove(record_type, id)
    }

    fn commit(&mut self) -> StoreResult<()> {
        // the file is written first: a failed write leaves the batch
        // uncommitted in memory too, so rollback still discards it
        if self.inner.pending_writes() > 0 {
            self.persist(self.inner.working_records())?;
        }
        self.inner.commit()
    }

    fn release(&mut self) -> StoreResult<()> {
        self.inner.release()
    }

    fn release_record(&mut self, record: &RecordRef) -> StoreResult<()> {
        self.inner.release_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn seed() -> Vec<Record> {
        vec![
            Record::new("identity", "1").with("name", json!("alice")),
            Record::new("identity", "2").with("name", json!("bob")),
        ]
    }

    #[test]
    fn test_create_then_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        JsonFileStore::create(&path, seed()).unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.memory().durable_count("identity"), 2);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        JsonFileStore::create(&path, seed()).unwrap();
        assert!(JsonFileStore::create(&path, seed()).is_err());
    }

    #[test]
    fn test_commit_persists_and_uncommitted_is_lost() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = JsonFileStore::create(&path, seed()).unwrap();

        store.remove("identity", "1").unwrap();
        store.commit().unwrap();
        store.save(Record::new("identity", "3")).unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        let memory = reopened.memory();
        assert!(memory.durable_record("identity", "1").is_none());
        assert!(memory.durable_record("identity", "2").is_some());
        assert!(memory.durable_record("identity", "3").is_none());
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        JsonFileStore::create(&path, seed()).unwrap();

        let tampered = fs::read_to_string(&path).unwrap().replace("alice", "mallory");
        fs::write(&path, tampered).unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_failed_write_keeps_batch_uncommitted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = JsonFileStore::create(&path, seed()).unwrap();

        store.save(Record::new("identity", "3")).unwrap();
        fs::create_dir(path.with_extension("tmp")).unwrap();
        assert!(store.commit().is_err());
        assert_eq!(store.memory().pending_writes(), 1);
        assert!(store.memory().durable_record("identity", "3").is_none());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = JsonFileStore::create(&path, seed()).unwrap();
        store.save(Record::new("identity", "9")).unwrap();
        store.commit().unwrap();
        assert!(!path.with_extension("tmp").exists());
    }
}
