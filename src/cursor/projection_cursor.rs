//! Lazy projected-row cursor
//!
//! Snapshots the matching identifiers, then re-queries `chunk_size` of them
//! at a time with the original filter narrowed to those ids. Rows come back
//! in snapshot order. An id missing from a re-query was deleted or stopped
//! matching and is skipped.

use std::collections::{HashMap, VecDeque};

use crate::observability::{log_event_with_fields, Event};
use crate::store::{Query, RecordStore, Row, StoreError, ID_FIELD};

use super::collector::{collect_ids, IdSet};
use super::errors::{CursorError, CursorResult};

/// One projected row and the identifier it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRow {
    pub id: String,
    /// Values in the order of the query's field list
    pub row: Row,
}

#[derive(Debug)]
pub struct ProjectionCursor {
    query: Query,
    ids: Vec<String>,
    offset: usize,
    chunk_size: usize,
    buffer: VecDeque<ProjectedRow>,
    produced: usize,
    stale: usize,
    round_trips: usize,
}

impl ProjectionCursor {
    /// Snapshot ids matching `query`, projecting `query.fields` lazily.
    ///
    /// A `chunk_size` of 0 is treated as 1.
    pub fn from_query<S: RecordStore + ?Sized>(
        store: &mut S,
        query: Query,
        chunk_size: usize,
    ) -> CursorResult<Self> {
        let set = collect_ids(store, &query.record_type, Some(&query.filter), None)?;
        Ok(Self::over(query, set, chunk_size))
    }

    /// Project `query.fields` for an existing snapshot
    pub fn over(query: Query, set: IdSet, chunk_size: usize) -> Self {
        let (_, ids) = set.into_parts();
        Self {
            query,
            ids,
            offset: 0,
            chunk_size: chunk_size.max(1),
            buffer: VecDeque::new(),
            produced: 0,
            stale: 0,
            round_trips: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn produced_count(&self) -> usize {
        self.produced
    }

    pub fn stale_count(&self) -> usize {
        self.stale
    }

    /// Re-fetch queries issued so far
    pub fn round_trips(&self) -> usize {
        self.round_trips
    }

    pub fn fields(&self) -> &[String] {
        &self.query.fields
    }

    pub fn has_next<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> CursorResult<bool> {
        while self.buffer.is_empty() && self.offset < self.ids.len() {
            self.fill(store)?;
        }
        Ok(!self.buffer.is_empty())
    }

    pub fn next<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> CursorResult<ProjectedRow> {
        if !self.has_next(store)? {
            return Err(CursorError::Exhausted {
                record_type: self.query.record_type.clone(),
                produced: self.produced,
            });
        }
        let row = self
            .buffer
            .pop_front()
            .ok_or_else(|| CursorError::Exhausted {
                record_type: self.query.record_type.clone(),
                produced: self.produced,
            })?;
        self.produced += 1;
        Ok(row)
    }

    fn fill<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> CursorResult<()> {
        let end = (self.offset + self.chunk_size).min(self.ids.len());
        let chunk = &self.ids[self.offset..end];

        let mut fields = Vec::with_capacity(self.query.fields.len() + 1);
        fields.push(ID_FIELD.to_string());
        fields.extend(self.query.fields.iter().cloned());
        let refetch = Query {
            record_type: self.query.record_type.clone(),
            filter: self.query.filter.restricted_to_ids(chunk),
            fields,
        };

        let mut stream = store.query(&refetch)?;
        self.round_trips += 1;
        let mut found: HashMap<String, Row> = HashMap::with_capacity(chunk.len());
        while let Some(mut row) = stream.next_row()? {
            let id = match row.first_str() {
                Some(id) => id.to_string(),
                None => {
                    return Err(StoreError::query(
                        &self.query.record_type,
                        "identifier column missing or not a string",
                    )
                    .into())
                }
            };
            row.values.remove(0);
            found.insert(id, row);
        }
        stream.close();

        for id in chunk {
            match found.remove(id) {
                Some(row) => self.buffer.push_back(ProjectedRow {
                    id: id.clone(),
                    row,
                }),
                None => {
                    self.stale += 1;
                    log_event_with_fields(
                        Event::CursorStaleSkipped,
                        &[
                            ("id", id.as_str()),
                            ("record_type", self.query.record_type.as_str()),
                        ],
                    );
                }
            }
        }
        self.offset = end;
        Ok(())
    }
}
