//! Checkpointing
//!
//! A checkpoint commits the session's pending writes and then releases
//! every materialized record. Release never runs if the commit failed.

use crate::observability::{log_event_with_fields, Event};
use crate::store::{RecordStore, StoreResult};

use super::errors::{BatchError, BatchResult};

/// Commit, then release
pub fn checkpoint<S: RecordStore + ?Sized>(store: &mut S) -> StoreResult<()> {
    store.commit()?;
    store.release()
}

/// Checkpoints every `interval` increments for callers driving their own
/// loop.
///
/// The counter holds the session for its lifetime so the loop reaches the
/// store through `session()`.
pub struct CheckpointCounter<'s, S: RecordStore + ?Sized> {
    store: &'s mut S,
    interval: u64,
    count: u64,
    checkpoints: u64,
}

impl<'s, S: RecordStore + ?Sized> CheckpointCounter<'s, S> {
    pub fn new(store: &'s mut S, interval: usize) -> BatchResult<Self> {
        if interval == 0 {
            return Err(BatchError::invalid_size("checkpoint interval", interval));
        }
        Ok(Self {
            store,
            interval: interval as u64,
            count: 0,
            checkpoints: 0,
        })
    }

    /// Count one unit of work. Returns true if this crossed an interval
    /// boundary and a checkpoint ran.
    pub fn increment(&mut self) -> BatchResult<bool> {
        self.count += 1;
        if self.count % self.interval != 0 {
            return Ok(false);
        }
        self.run_checkpoint()?;
        Ok(true)
    }

    pub fn session(&mut self) -> &mut S {
        &mut *self.store
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn checkpoints(&self) -> u64 {
        self.checkpoints
    }

    /// Checkpoint a trailing partial interval, if any. Returns the total
    /// number of checkpoints taken.
    pub fn finish(mut self) -> BatchResult<u64> {
        if self.count % self.interval != 0 {
            self.run_checkpoint()?;
        }
        Ok(self.checkpoints)
    }

    fn run_checkpoint(&mut self) -> BatchResult<()> {
        checkpoint(&mut *self.store)
            .map_err(|e| BatchError::store_failed("counter checkpoint failed", e))?;
        self.checkpoints += 1;
        let count = self.count.to_string();
        log_event_with_fields(Event::CounterCheckpoint, &[("count", count.as_str())]);
        Ok(())
    }
}
