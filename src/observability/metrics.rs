//! Batch metrics registry
//!
//! Counters only, monotonic, relaxed atomics. A registry can be shared
//! between a running batch and a supervisor that reports on it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    positions_processed: AtomicU64,
    work_units_invoked: AtomicU64,
    stale_skipped: AtomicU64,
    checkpoints: AtomicU64,
    flushes: AtomicU64,
    runs_completed: AtomicU64,
    runs_terminated: AtomicU64,
    runs_aborted: AtomicU64,
    ids_collected: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_positions(&self) {
        self.positions_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invocations(&self) {
        self.work_units_invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stale(&self) {
        self.stale_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_checkpoints(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_flushes(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_runs_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_runs_terminated(&self) {
        self.runs_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_runs_aborted(&self) {
        self.runs_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_ids_collected(&self, count: u64) {
        self.ids_collected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn checkpoints(&self) -> u64 {
        self.checkpoints.load(Ordering::Relaxed)
    }

    pub fn positions(&self) -> u64 {
        self.positions_processed.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            positions_processed: self.positions_processed.load(Ordering::Relaxed),
            work_units_invoked: self.work_units_invoked.load(Ordering::Relaxed),
            stale_skipped: self.stale_skipped.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_terminated: self.runs_terminated.load(Ordering::Relaxed),
            runs_aborted: self.runs_aborted.load(Ordering::Relaxed),
            ids_collected: self.ids_collected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub positions_processed: u64,
    pub work_units_invoked: u64,
    pub stale_skipped: u64,
    pub checkpoints: u64,
    pub flushes: u64,
    pub runs_completed: u64,
    pub runs_terminated: u64,
    pub runs_aborted: u64,
    pub ids_collected: u64,
}
