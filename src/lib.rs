//! aerobatch - bounded-memory batch processing over a record store
//!
//! Two-phase scans (identifier snapshot, then lazy fetch) with periodic
//! commit-and-release checkpoints and cooperative termination.

pub mod batch;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod observability;
pub mod store;
pub mod termination;
