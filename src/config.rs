//! Batch configuration
//!
//! Loaded from a JSON file. Every field except `store_path` has a default;
//! values are validated before use and an invalid file is rejected whole.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event, Logger, Severity};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// JSON record store file
    pub store_path: PathBuf,

    /// Positions between checkpoints
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Identifiers per projection re-query
    #[serde(default = "default_projection_chunk_size")]
    pub projection_chunk_size: usize,

    /// trace, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_batch_size() -> usize {
    100
}
fn default_projection_chunk_size() -> usize {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}

impl BatchConfig {
    /// Config with defaults for everything but the store location
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            batch_size: default_batch_size(),
            projection_chunk_size: default_projection_chunk_size(),
            log_level: default_log_level(),
        }
    }

    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BatchConfig = serde_json::from_str(&content)?;
        config.validate()?;

        let shown = path.display().to_string();
        let batch_size = config.batch_size.to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", shown.as_str()),
                ("batch_size", batch_size.as_str()),
                ("log_level", config.log_level.as_str()),
            ],
        );
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.store_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store_path must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.projection_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "projection_chunk_size must be > 0".into(),
            ));
        }
        self.severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    /// Make `log_level` the process-wide logging threshold
    pub fn apply_logging(&self) -> ConfigResult<()> {
        Logger::set_min_severity(self.severity()?);
        Ok(())
    }
}
