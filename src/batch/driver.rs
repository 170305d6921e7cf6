//! Batch driver
//!
//! Walks an identifier snapshot with a `RecordCursor`, invokes the work
//! unit on every live record and checkpoints the session every
//! `batch_size` positions.
//!
//! # Position counting
//!
//! A position is one snapshot identifier consumed by the scan. Stale
//! identifiers between live records count toward the batch boundary like
//! any other. Stale identifiers after the last live record are never
//! consumed, so a snapshot whose records were all deleted runs no
//! checkpoint at all.
//!
//! # Checkpoint schedule
//!
//! - after every position that is a positive multiple of `batch_size`
//! - once more after the scan if the final batch was partial
//! - once more after termination if any position was processed
//!
//! A failure aborts immediately. Nothing since the last checkpoint is
//! committed; the caller owns the session and decides what to do with the
//! uncommitted work.

use std::sync::Arc;

use crate::config::BatchConfig;
use crate::cursor::{collect_ids, IdSet, RecordCursor, Slot};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::{Filter, Query, RecordStore};
use crate::termination::TerminationFlag;

use super::checkpoint::checkpoint;
use super::errors::{BatchError, BatchResult};
use super::summary::{RunPhase, RunSummary};
use super::work_unit::{Params, WorkUnit};

#[derive(Debug, Clone)]
pub struct BatchDriver {
    batch_size: usize,
    termination: TerminationFlag,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl BatchDriver {
    pub fn new(batch_size: usize) -> BatchResult<Self> {
        if batch_size == 0 {
            return Err(BatchError::invalid_size("batch size", batch_size));
        }
        Ok(Self {
            batch_size,
            termination: TerminationFlag::new(),
            metrics: None,
        })
    }

    pub fn from_config(config: &BatchConfig) -> BatchResult<Self> {
        Self::new(config.batch_size)
    }

    /// Observe an externally owned termination flag instead of a private one
    pub fn with_termination(mut self, termination: TerminationFlag) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Handle a supervisor can use to stop the run
    pub fn termination(&self) -> &TerminationFlag {
        &self.termination
    }

    /// Snapshot matching identifiers, stopping early on termination
    pub fn collect_identifiers<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        record_type: &str,
        filter: Option<&Filter>,
    ) -> BatchResult<IdSet> {
        let set = collect_ids(store, record_type, filter, Some(&self.termination))
            .map_err(|e| BatchError::store_failed("identifier collection failed", e))?;
        if let Some(metrics) = &self.metrics {
            metrics.add_ids_collected(set.len() as u64);
        }
        Ok(set)
    }

    /// Collect the ids matching `query` and run `work` over them.
    ///
    /// If termination interrupts the collection, the partial snapshot is
    /// not processed and the summary reports the run as terminated.
    pub fn run_query<S, W>(
        &self,
        store: &mut S,
        query: &Query,
        work: &mut W,
        params: &Params,
    ) -> BatchResult<RunSummary>
    where
        S: RecordStore + ?Sized,
        W: WorkUnit<S> + ?Sized,
    {
        let set = self.collect_identifiers(store, &query.record_type, Some(&query.filter))?;
        if !set.is_complete() {
            let mut summary = RunSummary::begin(set.record_type(), self.batch_size, set.len());
            summary.terminated = true;
            self.log_finish(&summary);
            return Ok(summary.finish(RunPhase::Done));
        }
        self.run(store, set, work, params)
    }

    /// Process every live record of `ids` in snapshot order
    pub fn run<S, W>(
        &self,
        store: &mut S,
        ids: IdSet,
        work: &mut W,
        params: &Params,
    ) -> BatchResult<RunSummary>
    where
        S: RecordStore + ?Sized,
        W: WorkUnit<S> + ?Sized,
    {
        let mut summary = RunSummary::begin(ids.record_type(), self.batch_size, ids.len());
        if ids.is_empty() {
            return Ok(summary.finish(RunPhase::Done));
        }

        let run_id = summary.run_id.to_string();
        let snapshot_size = summary.snapshot_size.to_string();
        let batch_size = self.batch_size.to_string();
        log_event_with_fields(
            Event::RunBegin,
            &[
                ("run_id", run_id.as_str()),
                ("record_type", summary.record_type.as_str()),
                ("snapshot_size", snapshot_size.as_str()),
                ("batch_size", batch_size.as_str()),
            ],
        );

        summary.phase = RunPhase::Scanning;
        let mut cursor = RecordCursor::from_id_set(ids);

        if let Err(err) = self.scan(store, &mut cursor, work, params, &mut summary) {
            let err = match err.position() {
                Some(_) => err,
                None => err.at(summary.processed + 1, summary.durable_through),
            };
            summary.phase = RunPhase::Aborted;
            self.log_abort(&summary, &err);
            return Err(err);
        }

        if summary.processed > 0
            && (summary.processed % self.batch_size as u64 != 0 || summary.terminated)
        {
            summary.phase = RunPhase::Flushing;
            if let Err(e) = self.commit_batch(store, &mut summary, Event::Flush) {
                let err = e.at(summary.processed, summary.durable_through);
                summary.phase = RunPhase::Aborted;
                self.log_abort(&summary, &err);
                return Err(err);
            }
            summary.flushed = true;
        }

        summary.stale_skipped = cursor.stale_count() as u64;
        self.log_finish(&summary);
        Ok(summary.finish(RunPhase::Done))
    }

    fn scan<S, W>(
        &self,
        store: &mut S,
        cursor: &mut RecordCursor,
        work: &mut W,
        params: &Params,
        summary: &mut RunSummary,
    ) -> BatchResult<()>
    where
        S: RecordStore + ?Sized,
        W: WorkUnit<S> + ?Sized,
    {
        // termination is only observed while a live record remains, so a
        // snapshot with no live record is a no-op either way
        loop {
            if !cursor.has_next(store)? {
                break;
            }
            if self.termination.is_requested() {
                summary.terminated = true;
                break;
            }
            let Some(slot) = cursor.step(store)? else {
                break;
            };

            match slot {
                Slot::Live(record) => {
                    work.execute(store, &record, params)
                        .map_err(|e| BatchError::work_unit_failed(&record.reference(), e))?;
                    summary.invoked += 1;
                    self.metric(MetricsRegistry::increment_invocations);
                }
                Slot::Stale(_) => self.metric(MetricsRegistry::increment_stale),
            }
            summary.processed += 1;
            self.metric(MetricsRegistry::increment_positions);

            if summary.processed % self.batch_size as u64 == 0 {
                summary.phase = RunPhase::Checkpointing;
                self.commit_batch(store, summary, Event::Checkpoint)
                    .map_err(|e| e.at(summary.processed, summary.durable_through))?;
                // a live record fetched ahead of the release is detached now
                cursor.refresh(store)?;
                summary.phase = RunPhase::Scanning;
            }
        }
        Ok(())
    }

    fn commit_batch<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        summary: &mut RunSummary,
        event: Event,
    ) -> BatchResult<()> {
        checkpoint(store).map_err(|e| BatchError::store_failed("checkpoint failed", e))?;
        summary.checkpoints += 1;
        summary.durable_through = summary.processed;
        match event {
            Event::Flush => self.metric(MetricsRegistry::increment_flushes),
            _ => self.metric(MetricsRegistry::increment_checkpoints),
        }

        let position = summary.processed.to_string();
        let total = summary.snapshot_size.to_string();
        log_event_with_fields(
            event,
            &[
                ("record_type", summary.record_type.as_str()),
                ("position", position.as_str()),
                ("total", total.as_str()),
            ],
        );
        Ok(())
    }

    fn log_finish(&self, summary: &RunSummary) {
        let run_id = summary.run_id.to_string();
        let processed = summary.processed.to_string();
        let invoked = summary.invoked.to_string();
        let stale = summary.stale_skipped.to_string();
        let checkpoints = summary.checkpoints.to_string();
        let fields = [
            ("run_id", run_id.as_str()),
            ("record_type", summary.record_type.as_str()),
            ("processed", processed.as_str()),
            ("invoked", invoked.as_str()),
            ("stale_skipped", stale.as_str()),
            ("checkpoints", checkpoints.as_str()),
        ];
        if summary.terminated {
            log_event_with_fields(Event::RunTerminated, &fields);
            self.metric(MetricsRegistry::increment_runs_terminated);
        } else {
            log_event_with_fields(Event::RunComplete, &fields);
            self.metric(MetricsRegistry::increment_runs_completed);
        }
    }

    fn log_abort(&self, summary: &RunSummary, err: &BatchError) {
        let run_id = summary.run_id.to_string();
        let position = err.position().unwrap_or_default().to_string();
        let durable = err.durable_through().to_string();
        let reason = err.to_string();
        log_event_with_fields(
            Event::RunAborted,
            &[
                ("run_id", run_id.as_str()),
                ("record_type", summary.record_type.as_str()),
                ("code", err.code().code()),
                ("position", position.as_str()),
                ("durable_through", durable.as_str()),
                ("phase", summary.phase.as_str()),
                ("reason", reason.as_str()),
            ],
        );
        self.metric(MetricsRegistry::increment_runs_aborted);
    }

    fn metric(&self, f: impl FnOnce(&MetricsRegistry)) {
        if let Some(metrics) = &self.metrics {
            f(&**metrics);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchErrorCode, WorkUnitError};
    use crate::store::{MemoryStore, Record};
    use serde_json::json;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("id{:02}", i)).collect()
    }

    fn store_with(n: usize) -> MemoryStore {
        MemoryStore::with_records(
            ids(n)
                .into_iter()
                .map(|id| Record::new("identity", id).with("touched", json!(false))),
        )
    }

    fn touch(session: &mut MemoryStore, record: &Record, _: &Params) -> Result<(), WorkUnitError> {
        session.save(record.clone().with("touched", json!(true)))?;
        Ok(())
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = BatchDriver::new(0).unwrap_err();
        assert_eq!(err.code(), BatchErrorCode::AeroBatchInvalidSize);
    }

    #[test]
    fn test_checkpoint_count_is_ceiling() {
        let mut store = store_with(10);
        let driver = BatchDriver::new(3).unwrap();
        let summary = driver
            .run(&mut store, IdSet::new("identity", ids(10)), &mut touch, &Params::new())
            .unwrap();

        assert_eq!(summary.processed, 10);
        assert_eq!(summary.invoked, 10);
        assert_eq!(summary.checkpoints, 4);
        assert!(summary.flushed);
        assert_eq!(summary.phase, RunPhase::Done);
        assert_eq!(store.stats().commits, 4);
        assert_eq!(store.stats().releases, 4);
    }

    #[test]
    fn test_exact_multiple_has_no_flush() {
        let mut store = store_with(6);
        let driver = BatchDriver::new(3).unwrap();
        let summary = driver
            .run(&mut store, IdSet::new("identity", ids(6)), &mut touch, &Params::new())
            .unwrap();
        assert_eq!(summary.checkpoints, 2);
        assert!(!summary.flushed);
    }

    #[test]
    fn test_empty_snapshot_does_nothing() {
        let mut store = MemoryStore::new();
        let driver = BatchDriver::new(5).unwrap();
        let mut calls = 0;
        let mut unit = |_: &mut MemoryStore, _: &Record, _: &Params| -> Result<(), WorkUnitError> {
            calls += 1;
            Ok(())
        };
        let summary = driver
            .run(&mut store, IdSet::new("identity", vec![]), &mut unit, &Params::new())
            .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(summary.checkpoints, 0);
        assert_eq!(store.stats().commits, 0);
    }

    #[test]
    fn test_all_stale_snapshot_does_nothing() {
        let mut store = MemoryStore::new();
        let driver = BatchDriver::new(2).unwrap();
        let summary = driver
            .run(&mut store, IdSet::new("identity", ids(5)), &mut touch, &Params::new())
            .unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.checkpoints, 0);
        assert_eq!(summary.stale_skipped, 5);
        assert_eq!(store.stats().commits, 0);
    }

    #[test]
    fn test_params_reach_work_unit() {
        let mut store = store_with(2);
        let driver = BatchDriver::new(10).unwrap();
        let mut params = Params::new();
        params.insert("reason".into(), json!("audit"));
        let mut seen = Vec::new();
        let mut unit = |_: &mut MemoryStore, _: &Record, p: &Params| -> Result<(), WorkUnitError> {
            seen.push(p.get("reason").cloned());
            Ok(())
        };
        driver
            .run(&mut store, IdSet::new("identity", ids(2)), &mut unit, &params)
            .unwrap();
        assert_eq!(seen, vec![Some(json!("audit")), Some(json!("audit"))]);
    }

    #[test]
    fn test_failure_aborts_without_flush() {
        let mut store = store_with(5);
        let driver = BatchDriver::new(2).unwrap();
        let mut unit = |s: &mut MemoryStore, r: &Record, p: &Params| -> Result<(), WorkUnitError> {
            if r.id == "id04" {
                return Err(WorkUnitError::failed("rejected"));
            }
            touch(s, r, p)
        };
        let err = driver
            .run(&mut store, IdSet::new("identity", ids(5)), &mut unit, &Params::new())
            .unwrap_err();

        assert_eq!(err.code(), BatchErrorCode::AeroBatchWorkUnitFailed);
        assert_eq!(err.position(), Some(4));
        assert_eq!(err.durable_through(), 2);
        assert_eq!(store.stats().commits, 1);
        // id03 was touched in the session but never committed
        assert_eq!(
            store.durable_record("identity", "id03").unwrap().get("touched"),
            Some(&json!(false))
        );
        assert_eq!(store.pending_writes(), 1);
    }

    #[test]
    fn test_termination_before_scan_is_noop() {
        let mut store = store_with(4);
        let driver = BatchDriver::new(2).unwrap();
        driver.termination().request();
        let summary = driver
            .run(&mut store, IdSet::new("identity", ids(4)), &mut touch, &Params::new())
            .unwrap();
        assert!(summary.terminated);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.checkpoints, 0);
    }

    #[test]
    fn test_termination_mid_run_flushes_once() {
        let mut store = store_with(10);
        let driver = BatchDriver::new(3).unwrap();
        let flag = driver.termination().clone();
        let mut calls = 0;
        let mut unit = |s: &mut MemoryStore, r: &Record, p: &Params| -> Result<(), WorkUnitError> {
            calls += 1;
            if calls == 5 {
                flag.request();
            }
            touch(s, r, p)
        };
        let summary = driver
            .run(&mut store, IdSet::new("identity", ids(10)), &mut unit, &Params::new())
            .unwrap();

        assert!(summary.terminated);
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.checkpoints, 2);
        assert!(summary.flushed);
        let touched = store
            .durable_records()
            .filter(|r| r.get("touched") == Some(&json!(true)))
            .count();
        assert_eq!(touched, 5);
    }

    #[test]
    fn test_termination_on_boundary_still_flushes() {
        let mut store = store_with(10);
        let driver = BatchDriver::new(3).unwrap();
        let flag = driver.termination().clone();
        let mut calls = 0;
        let mut unit = |_: &mut MemoryStore, _: &Record, _: &Params| -> Result<(), WorkUnitError> {
            calls += 1;
            if calls == 3 {
                flag.request();
            }
            Ok(())
        };
        let summary = driver
            .run(&mut store, IdSet::new("identity", ids(10)), &mut unit, &Params::new())
            .unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.checkpoints, 2);
        assert!(summary.flushed);
    }

    #[test]
    fn test_checkpoint_failure_aborts() {
        let mut store = store_with(6);
        store.fail_commit_on(2);
        let driver = BatchDriver::new(2).unwrap();
        let err = driver
            .run(&mut store, IdSet::new("identity", ids(6)), &mut touch, &Params::new())
            .unwrap_err();
        assert_eq!(err.code(), BatchErrorCode::AeroBatchStoreFailed);
        assert_eq!(err.durable_through(), 2);
    }

    #[test]
    fn test_metrics_recorded() {
        let mut store = store_with(5);
        store.remove("identity", "id02").unwrap();
        store.commit().unwrap();
        let metrics = Arc::new(MetricsRegistry::new());
        let driver = BatchDriver::new(2).unwrap().with_metrics(Arc::clone(&metrics));
        let set = driver.collect_identifiers(&mut store, "identity", None).unwrap();
        assert_eq!(set.len(), 4);

        driver
            .run(&mut store, IdSet::new("identity", ids(5)), &mut touch, &Params::new())
            .unwrap();

        let snap = metrics.snapshot();
        assert_eq!(snap.ids_collected, 4);
        assert_eq!(snap.positions_processed, 5);
        assert_eq!(snap.work_units_invoked, 4);
        assert_eq!(snap.stale_skipped, 1);
        assert_eq!(snap.checkpoints, 2);
        assert_eq!(snap.flushes, 1);
        assert_eq!(snap.runs_completed, 1);
    }

    #[test]
    fn test_run_query_with_filter() {
        let mut store = MemoryStore::with_records((1..=6).map(|i| {
            Record::new("identity", format!("id{}", i)).with("even", json!(i % 2 == 0))
        }));
        let driver = BatchDriver::new(2).unwrap();
        let query = Query::filtered("identity", Filter::all().and_eq("even", json!(true)));
        let mut seen = Vec::new();
        let mut unit = |_: &mut MemoryStore, r: &Record, _: &Params| -> Result<(), WorkUnitError> {
            seen.push(r.id.clone());
            Ok(())
        };
        let summary = driver
            .run_query(&mut store, &query, &mut unit, &Params::new())
            .unwrap();
        assert_eq!(seen, vec!["id2", "id4", "id6"]);
        assert_eq!(summary.checkpoints, 2);
    }

    #[test]
    fn test_run_query_terminated_during_collection() {
        let mut store = store_with(4);
        let driver = BatchDriver::new(2).unwrap();
        driver.termination().request();
        let summary = driver
            .run_query(&mut store, &Query::all("identity"), &mut touch, &Params::new())
            .unwrap();
        assert!(summary.terminated);
        assert_eq!(summary.processed, 0);
        assert_eq!(store.stats().fetches, 0);
    }

    #[test]
    fn test_record_after_stale_boundary_is_fetched_after_release() {
        let mut store = store_with(6);
        store.remove("identity", "id03").unwrap();
        store.commit().unwrap();

        // id03 lands on the first boundary; id04 is fetched ahead of it
        let driver = BatchDriver::new(3).unwrap();
        let mut calls = Vec::new();
        let mut unit = |s: &mut MemoryStore, r: &Record, _: &Params| -> Result<(), WorkUnitError> {
            calls.push((r.id.clone(), s.stats().releases, s.cached()));
            Ok(())
        };
        let summary = driver
            .run(&mut store, IdSet::new("identity", ids(6)), &mut unit, &Params::new())
            .unwrap();

        assert_eq!(summary.stale_skipped, 1);
        let id04 = calls.iter().find(|(id, _, _)| id == "id04").unwrap();
        assert_eq!(id04.1, 1);
        assert_eq!(id04.2, 1);
        assert!(calls.iter().all(|(_, _, cached)| *cached >= 1));
    }
}
