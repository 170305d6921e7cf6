//! Batch processing engine
//!
//! Runs a work unit over every record of an identifier snapshot while
//! bounding both memory and transaction size:
//!
//! - one materialized record at a time (`RecordCursor`)
//! - a commit and release every `batch_size` positions (`BatchDriver`)
//! - cooperative termination between records (`TerminationFlag`)
//!
//! `CheckpointCounter` offers the same checkpoint cadence to callers that
//! drive their own loop.

mod checkpoint;
mod driver;
mod errors;
mod removal;
mod summary;
mod work_unit;

pub use checkpoint::{checkpoint, CheckpointCounter};
pub use driver::BatchDriver;
pub use errors::{BatchError, BatchErrorCode, BatchResult, WorkUnitError};
pub use removal::remove_matching;
pub use summary::{RunPhase, RunSummary};
pub use work_unit::{Params, RemoveRecord, SetAttributes, WorkUnit};
