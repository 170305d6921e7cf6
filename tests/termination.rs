//! Cooperative Termination Tests
//!
//! Properties:
//! - Termination observed after B + r positions (0 < r < B) yields exactly
//!   one boundary checkpoint plus one flush
//! - Termination is only observed between records
//! - A supervisor thread can stop a running batch

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aerobatch::batch::{BatchDriver, Params, WorkUnitError};
use aerobatch::cursor::IdSet;
use aerobatch::observability::MetricsRegistry;
use aerobatch::store::{MemoryStore, Record, RecordStore};
use aerobatch::termination::TerminationFlag;
use serde_json::json;

fn store_with(n: usize) -> (MemoryStore, IdSet) {
    let ids: Vec<String> = (0..n).map(|i| format!("r{:04}", i)).collect();
    let store = MemoryStore::with_records(
        ids.iter()
            .map(|id| Record::new("job", id.as_str()).with("done", json!(false))),
    );
    (store, IdSet::new("job", ids))
}

fn noop(_: &mut MemoryStore, _: &Record, _: &Params) -> Result<(), WorkUnitError> {
    Ok(())
}

fn done_count(store: &MemoryStore) -> usize {
    store
        .durable_records()
        .filter(|r| r.get("done") == Some(&json!(true)))
        .count()
}

#[test]
fn test_termination_after_partial_batch_flushes_once() {
    let batch = 4;
    for r in 1..batch {
        let (mut store, ids) = store_with(20);
        let flag = TerminationFlag::new();
        let driver = BatchDriver::new(batch)
            .unwrap()
            .with_termination(flag.clone());

        let stop_after = (batch + r) as u64;
        let mut calls = 0u64;
        let mut unit = |s: &mut MemoryStore, rec: &Record, _: &Params| -> Result<(), WorkUnitError> {
            s.save(rec.clone().with("done", json!(true)))?;
            calls += 1;
            if calls == stop_after {
                flag.request();
            }
            Ok(())
        };
        let summary = driver.run(&mut store, ids, &mut unit, &Params::new()).unwrap();

        assert!(summary.terminated);
        assert_eq!(summary.processed, stop_after);
        assert_eq!(summary.checkpoints, 2, "r={}", r);
        assert!(summary.flushed);
        assert_eq!(done_count(&store), stop_after as usize);
    }
}

#[test]
fn test_in_flight_record_completes_before_stop() {
    let (mut store, ids) = store_with(10);
    let driver = BatchDriver::new(100).unwrap();
    let flag = driver.termination().clone();
    let mut unit = |s: &mut MemoryStore, rec: &Record, _: &Params| -> Result<(), WorkUnitError> {
        // request mid-record; this record still finishes and is committed
        flag.request();
        s.save(rec.clone().with("done", json!(true)))?;
        Ok(())
    };
    let summary = driver.run(&mut store, ids, &mut unit, &Params::new()).unwrap();
    assert_eq!(summary.invoked, 1);
    assert_eq!(summary.checkpoints, 1);
    assert_eq!(done_count(&store), 1);
}

#[test]
fn test_flag_reset_allows_rerun() {
    let (mut store, ids) = store_with(5);
    let driver = BatchDriver::new(2).unwrap();
    driver.termination().request();
    let first = driver
        .run(&mut store, ids.clone(), &mut noop, &Params::new())
        .unwrap();
    assert!(first.terminated);
    assert_eq!(first.processed, 0);

    driver.termination().reset();
    let second = driver
        .run(&mut store, ids, &mut noop, &Params::new())
        .unwrap();
    assert!(!second.terminated);
    assert_eq!(second.processed, 5);
}

#[test]
fn test_supervisor_thread_stops_run() {
    let (mut store, ids) = store_with(10_000);
    let metrics = Arc::new(MetricsRegistry::new());
    let driver = BatchDriver::new(50)
        .unwrap()
        .with_metrics(Arc::clone(&metrics));
    let flag = driver.termination().clone();

    let started = Arc::new(AtomicU64::new(0));
    let started_by_unit = Arc::clone(&started);
    let supervisor = thread::spawn(move || {
        while started.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }
        flag.request();
    });

    let mut unit = |s: &mut MemoryStore, rec: &Record, _: &Params| -> Result<(), WorkUnitError> {
        started_by_unit.fetch_add(1, Ordering::SeqCst);
        s.save(rec.clone().with("done", json!(true)))?;
        // keep the scan slower than the supervisor
        thread::sleep(Duration::from_micros(50));
        Ok(())
    };
    let summary = driver.run(&mut store, ids, &mut unit, &Params::new()).unwrap();
    supervisor.join().unwrap();

    assert!(summary.terminated);
    assert!(summary.processed < 10_000);
    // everything processed was committed by a checkpoint or the final flush
    assert_eq!(done_count(&store) as u64, summary.processed);
    assert_eq!(store.pending_writes(), 0);
    assert_eq!(metrics.snapshot().runs_terminated, 1);
}
