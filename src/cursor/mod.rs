//! Cursors over large result sets
//!
//! Both cursors work in two phases:
//!
//! 1. Snapshot: run an identifier-only query and keep the ordered ids
//! 2. Stream: fetch the full record (or projected row) per id as the
//!    caller advances
//!
//! The snapshot is never re-evaluated. Ids that stop resolving are skipped;
//! ids created after the snapshot are never seen.

mod collector;
mod errors;
mod projection_cursor;
mod record_cursor;

pub use collector::{collect_ids, IdSet};
pub use errors::{CursorError, CursorResult};
pub use projection_cursor::{ProjectedRow, ProjectionCursor};
pub use record_cursor::{RecordCursor, Records, Slot};
