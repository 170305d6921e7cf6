//! CLI module for AeroBatch
//!
//! Provides command-line interface for:
//! - collect: Print matching identifiers
//! - touch: Batch attribute update
//! - remove: Batch deletion
//! - project: Stream projected rows

mod args;
mod commands;
mod errors;
mod io;

pub use args::{parse_assignment, Cli, Command, Target};
pub use commands::{collect, project, remove, run, run_command, touch};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_json, write_pretty};
