//! CLI argument definitions using clap
//!
//! Commands:
//! - aerobatch collect --type <T> [--where f=v]...
//! - aerobatch touch --type <T> --set f=v... [--where f=v]... [--deadline-secs N]
//! - aerobatch remove --type <T> [--where f=v]...
//! - aerobatch project --type <T> --fields a,b [--where f=v]...

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};

use crate::store::Filter;

use super::errors::{CliError, CliResult};

/// AeroBatch - bounded-memory batch processing over a record store
#[derive(Parser, Debug)]
#[command(name = "aerobatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Store, record type and filter shared by every command
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Path to configuration file
    #[arg(long, default_value = "./aerobatch.json")]
    pub config: PathBuf,

    /// Record type to operate on
    #[arg(long = "type", value_name = "TYPE")]
    pub record_type: String,

    /// Equality condition; repeat to AND several
    #[arg(long = "where", value_name = "FIELD=VALUE")]
    pub conditions: Vec<String>,
}

impl Target {
    /// Conjunction of every `--where` condition
    pub fn filter(&self) -> CliResult<Filter> {
        let mut filter = Filter::all();
        for condition in &self.conditions {
            let (field, value) = parse_assignment(condition)?;
            filter = filter.and_eq(field, value);
        }
        Ok(filter)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the identifiers of matching records
    Collect {
        #[command(flatten)]
        target: Target,
    },

    /// Set attributes on every matching record, checkpointing in batches
    Touch {
        #[command(flatten)]
        target: Target,

        /// Attribute to set; repeat for several
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        assignments: Vec<String>,

        /// Stop cooperatively after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Delete every matching record, checkpointing in batches
    Remove {
        #[command(flatten)]
        target: Target,
    },

    /// Stream selected fields of matching records as JSON lines
    Project {
        #[command(flatten)]
        target: Target,

        /// Comma-separated fields to project
        #[arg(long, value_delimiter = ',', required = true)]
        fields: Vec<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

/// Split `field=value`. The value is read as JSON if it parses, otherwise
/// taken as a plain string.
pub fn parse_assignment(raw: &str) -> CliResult<(String, Value)> {
    let (field, value) = raw.split_once('=').ok_or_else(|| {
        CliError::invalid_argument(format!("expected FIELD=VALUE, got '{}'", raw))
    })?;
    let field = field.trim();
    if field.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "empty field name in '{}'",
            raw
        )));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

/// Collect `--set` assignments into work unit parameters
pub fn parse_params(assignments: &[String]) -> CliResult<Map<String, Value>> {
    let mut params = Map::new();
    for raw in assignments {
        let (field, value) = parse_assignment(raw)?;
        params.insert(field, value);
    }
    Ok(params)
}
