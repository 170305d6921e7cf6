//! In-memory record store
//!
//! Keeps two views of the data: the session's working view, which sees its
//! own uncommitted writes, and the durable view, which only changes on
//! commit. Materialized records are held in a cache until released, so the
//! cache size is the session's memory footprint.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::errors::{StoreError, StoreResult};
use super::record::{Query, Record, RecordRef};
use super::stream::{BufferedRowStream, RowStream};
use super::RecordStore;

type Collections = BTreeMap<String, BTreeMap<String, Record>>;

/// Operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub queries: u64,
    pub fetches: u64,
    pub writes: u64,
    pub commits: u64,
    /// Whole-session releases
    pub releases: u64,
    /// Single-record releases
    pub record_releases: u64,
    /// Largest number of materialized records held at once
    pub peak_cached: usize,
}

/// Store backed by ordered maps. Rows come back in identifier order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    working: Collections,
    durable: Collections,
    pending_writes: usize,
    cache: HashMap<RecordRef, Record>,
    open_handles: Arc<AtomicUsize>,
    stats: StoreStats,
    fail_commit_on: Option<u64>,
    fail_fetch_ids: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose durable state already holds `records`
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut store = Self::new();
        for record in records {
            store
                .durable
                .entry(record.record_type.clone())
                .or_default()
                .insert(record.id.clone(), record);
        }
        store.working = store.durable.clone();
        store
    }

    /// Discard uncommitted writes and the materialized cache
    pub fn rollback(&mut self) {
        self.working = self.durable.clone();
        self.pending_writes = 0;
        self.cache.clear();
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Records currently materialized in the session
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Writes not yet committed
    pub fn pending_writes(&self) -> usize {
        self.pending_writes
    }

    /// Row streams handed out and not yet closed
    pub fn open_streams(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Durable copy of a record, bypassing the session
    pub fn durable_record(&self, record_type: &str, id: &str) -> Option<&Record> {
        self.durable.get(record_type).and_then(|c| c.get(id))
    }

    /// Number of durable records of a type
    pub fn durable_count(&self, record_type: &str) -> usize {
        self.durable.get(record_type).map_or(0, BTreeMap::len)
    }

    /// Every durable record, ordered by type then identifier
    pub fn durable_records(&self) -> impl Iterator<Item = &Record> {
        self.durable.values().flat_map(BTreeMap::values)
    }

    /// Every record in the working view, ordered by type then identifier
    pub fn working_records(&self) -> impl Iterator<Item = &Record> {
        self.working.values().flat_map(BTreeMap::values)
    }

    /// Make the `n`th commit (1-based, counted from store creation) fail
    pub fn fail_commit_on(&mut self, n: u64) {
        self.fail_commit_on = Some(n);
    }

    /// Make every fetch of `id` fail with a store error
    pub fn fail_fetch_of(&mut self, id: impl Into<String>) {
        self.fail_fetch_ids.insert(id.into());
    }

    fn materialize(&mut self, record: Record) -> Record {
        self.cache.insert(record.reference(), record.clone());
        self.stats.peak_cached = self.stats.peak_cached.max(self.cache.len());
        record
    }
}

impl RecordStore for MemoryStore {
    fn query(&mut self, query: &Query) -> StoreResult<Box<dyn RowStream>> {
        self.stats.queries += 1;
        let rows: Vec<_> = self
            .working
            .get(&query.record_type)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|record| query.filter.matches(record))
            .map(|record| record.project(&query.fields))
            .collect();
        Ok(Box::new(BufferedRowStream::new(
            rows,
            Arc::clone(&self.open_handles),
        )))
    }

    fn fetch_by_id(&mut self, record_type: &str, id: &str) -> StoreResult<Option<Record>> {
        self.stats.fetches += 1;
        if self.fail_fetch_ids.contains(id) {
            return Err(StoreError::fetch(record_type, id, "injected fetch failure"));
        }
        let found = self
            .working
            .get(record_type)
            .and_then(|collection| collection.get(id))
            .cloned();
        Ok(found.map(|record| self.materialize(record)))
    }

    fn save(&mut self, record: Record) -> StoreResult<()> {
        if record.id.is_empty() {
            return Err(StoreError::Write(format!(
                "record of type '{}' has an empty id",
                record.record_type
            )));
        }
        self.stats.writes += 1;
        self.pending_writes += 1;
        let record = self.materialize(record);
        self.working
            .entry(record.record_type.clone())
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    fn remove(&mut self, record_type: &str, id: &str) -> StoreResult<bool> {
        let removed = self
            .working
            .get_mut(record_type)
            .and_then(|collection| collection.remove(id))
            .is_some();
        if removed {
            self.stats.writes += 1;
            self.pending_writes += 1;
            self.cache.remove(&RecordRef::new(record_type, id));
        }
        Ok(removed)
    }

    fn commit(&mut self) -> StoreResult<()> {
        let attempt = self.stats.commits + 1;
        if self.fail_commit_on == Some(attempt) {
            return Err(StoreError::Commit(format!(
                "injected failure on commit {}",
                attempt
            )));
        }
        self.stats.commits = attempt;
        if self.pending_writes > 0 {
            self.durable = self.working.clone();
            self.pending_writes = 0;
        }
        Ok(())
    }

    fn release(&mut self) -> StoreResult<()> {
        self.stats.releases += 1;
        self.cache.clear();
        Ok(())
    }

    fn release_record(&mut self, record: &RecordRef) -> StoreResult<()> {
        self.stats.record_releases += 1;
        self.cache.remove(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Filter;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::with_records(vec![
            Record::new("identity", "b").with("dept", json!("eng")),
            Record::new("identity", "a").with("dept", json!("ops")),
            Record::new("identity", "c").with("dept", json!("eng")),
            Record::new("role", "r1"),
        ])
    }

    fn drain(stream: &mut dyn RowStream) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(row) = stream.next_row().unwrap() {
            ids.push(row.first_str().unwrap().to_string());
        }
        ids
    }

    #[test]
    fn test_query_projects_in_id_order() {
        let mut store = store();
        let mut stream = store.query(&Query::all("identity").with_fields(["id"])).unwrap();
        assert_eq!(drain(stream.as_mut()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_query_applies_filter() {
        let mut store = store();
        let query = Query::filtered("identity", Filter::all().and_eq("dept", json!("eng")))
            .with_fields(["id"]);
        let mut stream = store.query(&query).unwrap();
        assert_eq!(drain(stream.as_mut()), vec!["b", "c"]);
    }

    #[test]
    fn test_fetch_missing_is_none() {
        let mut store = store();
        assert!(store.fetch_by_id("identity", "zzz").unwrap().is_none());
        assert!(store.fetch_by_id("nope", "a").unwrap().is_none());
    }

    #[test]
    fn test_fetch_materializes_until_release() {
        let mut store = store();
        store.fetch_by_id("identity", "a").unwrap();
        store.fetch_by_id("identity", "b").unwrap();
        assert_eq!(store.cached(), 2);

        store.release_record(&RecordRef::new("identity", "a")).unwrap();
        assert_eq!(store.cached(), 1);

        store.release().unwrap();
        assert_eq!(store.cached(), 0);
        assert_eq!(store.stats().peak_cached, 2);
    }

    #[test]
    fn test_writes_durable_only_after_commit() {
        let mut store = store();
        store
            .save(Record::new("identity", "d").with("dept", json!("eng")))
            .unwrap();
        store.remove("identity", "a").unwrap();

        // the session sees its own writes
        assert!(store.fetch_by_id("identity", "d").unwrap().is_some());
        assert!(store.durable_record("identity", "d").is_none());
        assert!(store.durable_record("identity", "a").is_some());

        store.commit().unwrap();
        assert!(store.durable_record("identity", "d").is_some());
        assert!(store.durable_record("identity", "a").is_none());
        assert_eq!(store.pending_writes(), 0);
    }

    #[test]
    fn test_rollback_discards_uncommitted() {
        let mut store = store();
        store.remove("identity", "a").unwrap();
        store.rollback();
        assert!(store.fetch_by_id("identity", "a").unwrap().is_some());
    }

    #[test]
    fn test_injected_failures() {
        let mut store = store();
        store.fail_commit_on(2);
        store.fail_fetch_of("b");

        store.commit().unwrap();
        assert!(matches!(store.commit(), Err(StoreError::Commit(_))));
        assert!(matches!(
            store.fetch_by_id("identity", "b"),
            Err(StoreError::Fetch { .. })
        ));
    }

    #[test]
    fn test_save_rejects_empty_id() {
        let mut store = store();
        assert!(store.save(Record::new("identity", "")).is_err());
    }

    #[test]
    fn test_open_streams_tracked() {
        let mut store = store();
        let stream = store.query(&Query::all("identity").with_fields(["id"])).unwrap();
        assert_eq!(store.open_streams(), 1);
        drop(stream);
        assert_eq!(store.open_streams(), 0);
    }
}
