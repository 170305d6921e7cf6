//! Bulk removal
//!
//! Deletes every record matching a filter through the regular batch
//! schedule, so memory and transaction size stay bounded however many
//! records match.

use crate::observability::{log_event_with_fields, Event};
use crate::store::{Filter, RecordStore};

use super::driver::BatchDriver;
use super::errors::BatchResult;
use super::summary::{RunPhase, RunSummary};
use super::work_unit::{Params, RemoveRecord};

/// Remove every `record_type` record matching `filter`.
///
/// Returns the run summary and the number of records actually removed,
/// which is lower than the snapshot size when records vanished
/// mid-run.
pub fn remove_matching<S: RecordStore + ?Sized>(
    driver: &BatchDriver,
    store: &mut S,
    record_type: &str,
    filter: Option<&Filter>,
) -> BatchResult<(RunSummary, u64)> {
    let ids = driver.collect_identifiers(store, record_type, filter)?;
    let mut unit = RemoveRecord::default();
    let summary = if ids.is_complete() {
        driver.run(store, ids, &mut unit, &Params::new())?
    } else {
        // interrupted while collecting; nothing removed
        let mut summary = RunSummary::begin(record_type, driver.batch_size(), ids.len());
        summary.terminated = true;
        summary.finish(RunPhase::Done)
    };

    let removed = unit.removed().to_string();
    log_event_with_fields(
        Event::RemoveComplete,
        &[("record_type", record_type), ("removed", removed.as_str())],
    );
    Ok((summary, unit.removed()))
}
