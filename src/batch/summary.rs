//! Run summary
//!
//! Returned by every run that does not abort. Serializes to the JSON the
//! CLI prints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Idle,
    Scanning,
    Checkpointing,
    Flushing,
    Done,
    Aborted,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "IDLE",
            RunPhase::Scanning => "SCANNING",
            RunPhase::Checkpointing => "CHECKPOINTING",
            RunPhase::Flushing => "FLUSHING",
            RunPhase::Done => "DONE",
            RunPhase::Aborted => "ABORTED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub record_type: String,
    pub batch_size: usize,
    /// Identifiers in the snapshot
    pub snapshot_size: usize,
    /// Snapshot positions consumed, live or stale
    pub processed: u64,
    /// Work unit invocations
    pub invoked: u64,
    /// Identifiers found deleted between snapshot and fetch
    pub stale_skipped: u64,
    /// Commit-and-release cycles, including the final flush
    pub checkpoints: u64,
    /// Whether the last cycle was a flush after the scan ended
    pub flushed: bool,
    /// Whether termination stopped the scan early
    pub terminated: bool,
    /// Positions covered by the last checkpoint
    pub durable_through: u64,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub(crate) fn begin(record_type: &str, batch_size: usize, snapshot_size: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            record_type: record_type.to_string(),
            batch_size,
            snapshot_size,
            processed: 0,
            invoked: 0,
            stale_skipped: 0,
            checkpoints: 0,
            flushed: false,
            terminated: false,
            durable_through: 0,
            phase: RunPhase::Idle,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn finish(mut self, phase: RunPhase) -> Self {
        self.phase = phase;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Positions processed since the last checkpoint
    pub fn uncommitted(&self) -> u64 {
        self.processed - self.durable_through
    }
}
