//! Work units
//!
//! A work unit is invoked once per live record. It receives the session,
//! so any writes it makes land in the same unit of work the driver
//! checkpoints.

use serde_json::{Map, Value};

use crate::store::{Record, RecordStore};

use super::errors::WorkUnitError;

/// Caller parameters passed unchanged to every invocation
pub type Params = Map<String, Value>;

pub trait WorkUnit<S: RecordStore + ?Sized> {
    fn execute(&mut self, session: &mut S, record: &Record, params: &Params)
        -> Result<(), WorkUnitError>;
}

impl<S, F> WorkUnit<S> for F
where
    S: RecordStore + ?Sized,
    F: FnMut(&mut S, &Record, &Params) -> Result<(), WorkUnitError>,
{
    fn execute(
        &mut self,
        session: &mut S,
        record: &Record,
        params: &Params,
    ) -> Result<(), WorkUnitError> {
        self(session, record, params)
    }
}

/// Copies every parameter onto the record as an attribute and saves it
#[derive(Debug, Default, Clone, Copy)]
pub struct SetAttributes;

impl<S: RecordStore + ?Sized> WorkUnit<S> for SetAttributes {
    fn execute(
        &mut self,
        session: &mut S,
        record: &Record,
        params: &Params,
    ) -> Result<(), WorkUnitError> {
        let mut updated = record.clone();
        for (field, value) in params {
            updated.set(field.as_str(), value.clone());
        }
        session.save(updated)?;
        Ok(())
    }
}

/// Deletes each record it is given and counts the deletions
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveRecord {
    removed: u64,
}

impl RemoveRecord {
    pub fn removed(&self) -> u64 {
        self.removed
    }
}

impl<S: RecordStore + ?Sized> WorkUnit<S> for RemoveRecord {
    fn execute(
        &mut self,
        session: &mut S,
        record: &Record,
        _params: &Params,
    ) -> Result<(), WorkUnitError> {
        if session.remove(&record.record_type, &record.id)? {
            self.removed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_closure_is_a_work_unit() {
        let mut store = MemoryStore::new();
        let mut seen = Vec::new();
        let mut unit = |_: &mut MemoryStore, r: &Record, _: &Params| -> Result<(), WorkUnitError> {
            seen.push(r.id.clone());
            Ok(())
        };
        unit.execute(&mut store, &Record::new("t", "1"), &Params::new())
            .unwrap();
        assert_eq!(seen, vec!["1"]);
    }

    #[test]
    fn test_set_attributes_saves_params() {
        let record = Record::new("identity", "a").with("dept", json!("ops"));
        let mut store = MemoryStore::with_records(vec![record.clone()]);
        let mut params = Params::new();
        params.insert("dept".into(), json!("eng"));
        params.insert("reviewed".into(), json!(true));

        SetAttributes.execute(&mut store, &record, &params).unwrap();

        let saved = store.fetch_by_id("identity", "a").unwrap().unwrap();
        assert_eq!(saved.get("dept"), Some(&json!("eng")));
        assert_eq!(saved.get("reviewed"), Some(&json!(true)));
        assert_eq!(store.pending_writes(), 1);
    }

    #[test]
    fn test_remove_record_counts_only_existing() {
        let record = Record::new("identity", "a");
        let mut store = MemoryStore::with_records(vec![record.clone()]);
        let mut unit = RemoveRecord::default();
        unit.execute(&mut store, &record, &Params::new()).unwrap();
        unit.execute(&mut store, &record, &Params::new()).unwrap();
        assert_eq!(unit.removed(), 1);
    }
}
