//! Identifier collection
//!
//! Runs an identifier-only query and materializes every matching id up
//! front. Memory is bounded by the number of ids, not by record size.

use serde::Serialize;

use crate::observability::{log_event_with_fields, Event};
use crate::store::{Filter, Query, RecordStore, StoreError, StoreResult, ID_FIELD};
use crate::termination::TerminationFlag;

/// An ordered identifier snapshot for one record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdSet {
    record_type: String,
    ids: Vec<String>,
    complete: bool,
}

impl IdSet {
    /// A complete set from explicit identifiers
    pub fn new(record_type: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            record_type: record_type.into(),
            ids,
            complete: true,
        }
    }

    pub fn from_ids<I, S>(record_type: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(record_type, ids.into_iter().map(Into::into).collect())
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// False when termination stopped the collecting scan early
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn into_parts(self) -> (String, Vec<String>) {
        (self.record_type, self.ids)
    }
}

/// Collect every identifier of `record_type` matching `filter`.
///
/// `None` collects all records of the type. If `termination` is requested
/// mid-scan the row stream is closed immediately and the partial set is
/// returned with `is_complete() == false`.
pub fn collect_ids<S: RecordStore + ?Sized>(
    store: &mut S,
    record_type: &str,
    filter: Option<&Filter>,
    termination: Option<&TerminationFlag>,
) -> StoreResult<IdSet> {
    let query = Query::filtered(record_type, filter.cloned().unwrap_or_default())
        .with_fields([ID_FIELD]);
    let mut stream = store.query(&query)?;

    let mut ids = Vec::new();
    let mut complete = true;

    loop {
        if termination.is_some_and(TerminationFlag::is_requested) {
            complete = false;
            break;
        }
        let Some(row) = stream.next_row()? else {
            break;
        };
        match row.first_str() {
            Some(id) => ids.push(id.to_string()),
            None => {
                stream.close();
                return Err(StoreError::query(
                    record_type,
                    "identifier column missing or not a string",
                ));
            }
        }
    }
    stream.close();

    let count = ids.len().to_string();
    let event = if complete {
        Event::IdCollectComplete
    } else {
        Event::IdCollectTruncated
    };
    log_event_with_fields(
        event,
        &[("record_type", record_type), ("ids", count.as_str())],
    );

    Ok(IdSet {
        record_type: record_type.to_string(),
        ids,
        complete,
    })
}
