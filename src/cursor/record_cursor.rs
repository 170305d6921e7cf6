//! Lazy record cursor over an identifier snapshot
//!
//! The identifier list is fixed at construction. Records are fetched one
//! at a time as the cursor advances, so at most one record (plus the ids
//! of any stale run being skipped) is held by the cursor at once. A record
//! buffered by `has_next` across a session release must be re-fetched with
//! `refresh` before it is handed out.
//!
//! Identifiers that no longer resolve are skipped, never raised.

use std::collections::VecDeque;

use crate::observability::{log_event_with_fields, Event};
use crate::store::{Query, Record, RecordRef, RecordStore};

use super::collector::{collect_ids, IdSet};
use super::errors::{CursorError, CursorResult};

/// Outcome of consuming one snapshot position
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Live(Record),
    /// The identifier vanished between snapshot and fetch
    Stale(RecordRef),
}

impl Slot {
    pub fn is_live(&self) -> bool {
        matches!(self, Slot::Live(_))
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Slot::Live(record) => Some(record),
            Slot::Stale(_) => None,
        }
    }
}

/// Forward-only, non-restartable cursor producing materialized records
#[derive(Debug)]
pub struct RecordCursor {
    record_type: String,
    ids: Vec<String>,
    /// Snapshot positions fetched so far. Never decreases.
    offset: usize,
    /// Positions fetched by `has_next` but not yet handed out. Holds zero
    /// or more stale slots followed by at most one live slot.
    lookahead: VecDeque<Slot>,
    produced: usize,
    stale: usize,
}

impl RecordCursor {
    /// Cursor over an explicit ordered identifier list
    pub fn new(record_type: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            record_type: record_type.into(),
            ids,
            offset: 0,
            lookahead: VecDeque::new(),
            produced: 0,
            stale: 0,
        }
    }

    pub fn from_id_set(set: IdSet) -> Self {
        let (record_type, ids) = set.into_parts();
        Self::new(record_type, ids)
    }

    /// Snapshot the ids matching `query`, then fetch lazily.
    ///
    /// The query's projected fields are ignored; records come back whole.
    pub fn from_query<S: RecordStore + ?Sized>(store: &mut S, query: &Query) -> CursorResult<Self> {
        let set = collect_ids(store, &query.record_type, Some(&query.filter), None)?;
        Ok(Self::from_id_set(set))
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// Snapshot cardinality, not adjusted for staleness
    pub fn size(&self) -> usize {
        self.ids.len()
    }

    /// Live records handed out so far
    pub fn produced_count(&self) -> usize {
        self.produced
    }

    /// Stale identifiers encountered so far
    pub fn stale_count(&self) -> usize {
        self.stale
    }

    /// Snapshot positions fetched from the store so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True if a live record remains.
    ///
    /// Fetches ahead past stale identifiers until one resolves. Those stale
    /// positions stay buffered so `step` still reports them in order.
    pub fn has_next<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> CursorResult<bool> {
        if matches!(self.lookahead.back(), Some(Slot::Live(_))) {
            return Ok(true);
        }
        while let Some(slot) = self.fetch_slot(store)? {
            let live = slot.is_live();
            self.lookahead.push_back(slot);
            if live {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Next live record, skipping stale identifiers.
    ///
    /// Errors with `CursorError::Exhausted` when none remain.
    pub fn next<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> CursorResult<Record> {
        if !self.has_next(store)? {
            return Err(CursorError::Exhausted {
                record_type: self.record_type.clone(),
                produced: self.produced,
            });
        }
        while let Some(slot) = self.lookahead.pop_front() {
            if let Slot::Live(record) = slot {
                self.produced += 1;
                return Ok(record);
            }
        }
        Err(CursorError::Exhausted {
            record_type: self.record_type.clone(),
            produced: self.produced,
        })
    }

    /// Re-resolve a buffered live record after the session was released.
    ///
    /// A record deleted in the meantime becomes a stale position.
    pub fn refresh<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> CursorResult<()> {
        let Some(Slot::Live(buffered)) = self.lookahead.back() else {
            return Ok(());
        };
        let reference = buffered.reference();
        let slot = match store.fetch_by_id(&reference.record_type, &reference.id)? {
            Some(record) => Slot::Live(record),
            None => self.stale_slot(&reference.id),
        };
        if let Some(back) = self.lookahead.back_mut() {
            *back = slot;
        }
        Ok(())
    }

    /// Consume exactly one snapshot position, live or stale.
    ///
    /// `None` once every position has been consumed.
    pub fn step<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> CursorResult<Option<Slot>> {
        let slot = match self.lookahead.pop_front() {
            Some(slot) => Some(slot),
            None => self.fetch_slot(store)?,
        };
        if matches!(slot, Some(Slot::Live(_))) {
            self.produced += 1;
        }
        Ok(slot)
    }

    /// Adapt to a std iterator borrowing the store for its lifetime
    pub fn records<'a, S: RecordStore + ?Sized>(&'a mut self, store: &'a mut S) -> Records<'a, S> {
        Records {
            cursor: self,
            store,
            failed: false,
        }
    }

    fn fetch_slot<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> CursorResult<Option<Slot>> {
        let Some(id) = self.ids.get(self.offset).cloned() else {
            return Ok(None);
        };
        let fetched = store.fetch_by_id(&self.record_type, &id)?;
        // advance only once the fetch succeeded, so a failed fetch can be retried
        self.offset += 1;
        let slot = match fetched {
            Some(record) => Slot::Live(record),
            None => self.stale_slot(&id),
        };
        Ok(Some(slot))
    }

    fn stale_slot(&mut self, id: &str) -> Slot {
        self.stale += 1;
        log_event_with_fields(
            Event::CursorStaleSkipped,
            &[("id", id), ("record_type", self.record_type.as_str())],
        );
        Slot::Stale(RecordRef::new(&self.record_type, id))
    }
}

/// Iterator over a cursor's live records. Stops after the first error.
pub struct Records<'a, S: RecordStore + ?Sized> {
    cursor: &'a mut RecordCursor,
    store: &'a mut S,
    failed: bool,
}

impl<S: RecordStore + ?Sized> Iterator for Records<'_, S> {
    type Item = CursorResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.cursor.has_next(self.store) {
            Ok(true) => Some(self.cursor.next(self.store)),
            Ok(false) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
