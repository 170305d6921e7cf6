//! CLI command implementations
//!
//! Every command loads the config, applies its log level, opens the JSON
//! store and hands the work to the batch engine. Nothing here touches
//! records directly.

use std::path::Path;
use std::thread;
use std::time::Duration;

use serde_json::json;

use crate::batch::{remove_matching, BatchDriver, SetAttributes};
use crate::config::BatchConfig;
use crate::cursor::ProjectionCursor;
use crate::observability::ObservationScope;
use crate::store::{JsonFileStore, Query};

use super::args::{parse_params, Command, Target};
use super::errors::CliResult;
use super::io::{write_json, write_pretty};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Collect { target } => observed("collect", || collect(&target)),
        Command::Touch {
            target,
            assignments,
            deadline_secs,
        } => observed("touch", || touch(&target, &assignments, deadline_secs)),
        Command::Remove { target } => observed("remove", || remove(&target)),
        Command::Project { target, fields } => observed("project", || project(&target, &fields)),
    }
}

fn observed(command: &str, f: impl FnOnce() -> CliResult<()>) -> CliResult<()> {
    let scope = ObservationScope::with_fields("CLI_COMMAND", &[("command", command)]);
    match f() {
        Ok(()) => {
            scope.complete();
            Ok(())
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e)
        }
    }
}

fn open(config_path: &Path) -> CliResult<(BatchConfig, JsonFileStore)> {
    let config = BatchConfig::load(config_path)?;
    config.apply_logging()?;
    let store = JsonFileStore::open(&config.store_path)?;
    Ok((config, store))
}

/// Print the identifier snapshot for the target
pub fn collect(target: &Target) -> CliResult<()> {
    let (config, mut store) = open(&target.config)?;
    let filter = target.filter()?;
    let driver = BatchDriver::from_config(&config)?;
    let set = driver.collect_identifiers(&mut store, &target.record_type, Some(&filter))?;
    write_json(&set)
}

/// Set attributes on every matching record
pub fn touch(target: &Target, assignments: &[String], deadline_secs: Option<u64>) -> CliResult<()> {
    let (config, mut store) = open(&target.config)?;
    let query = Query::filtered(target.record_type.as_str(), target.filter()?);
    let params = parse_params(assignments)?;
    let driver = BatchDriver::from_config(&config)?;

    // the timer is detached; if the run finishes first the process exits
    // with it still sleeping
    if let Some(secs) = deadline_secs {
        let flag = driver.termination().clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            flag.request();
        });
    }

    let summary = driver.run_query(&mut store, &query, &mut SetAttributes, &params)?;
    write_pretty(&summary)
}

/// Delete every matching record
pub fn remove(target: &Target) -> CliResult<()> {
    let (config, mut store) = open(&target.config)?;
    let filter = target.filter()?;
    let driver = BatchDriver::from_config(&config)?;
    let (summary, removed) =
        remove_matching(&driver, &mut store, &target.record_type, Some(&filter))?;
    write_pretty(&json!({ "removed": removed, "summary": summary }))
}

/// Stream projected rows, one JSON line each
pub fn project(target: &Target, fields: &[String]) -> CliResult<()> {
    let (config, mut store) = open(&target.config)?;
    let query = Query::filtered(target.record_type.as_str(), target.filter()?)
        .with_fields(fields.iter().map(String::as_str));
    let mut cursor =
        ProjectionCursor::from_query(&mut store, query, config.projection_chunk_size)?;
    while cursor.has_next(&mut store)? {
        let projected = cursor.next(&mut store)?;
        write_json(&json!({ "id": projected.id, "values": projected.row.values }))?;
    }
    Ok(())
}
