//! Batch error types
//!
//! Error codes:
//! - AERO_BATCH_INVALID_SIZE
//! - AERO_BATCH_STORE_FAILED
//! - AERO_BATCH_WORK_UNIT_FAILED
//! - AERO_BATCH_CURSOR_MISUSE
//!
//! Every error aborts the run. Work since the last checkpoint is not
//! committed; `durable_through` reports how far the committed work reaches.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::cursor::CursorError;
use crate::store::{RecordRef, StoreError};

/// Failure raised by a caller-supplied work unit
#[derive(Debug, Error)]
pub enum WorkUnitError {
    #[error("{0}")]
    Failed(String),

    #[error("store error in work unit: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
}

impl WorkUnitError {
    pub fn failed(reason: impl Into<String>) -> Self {
        WorkUnitError::Failed(reason.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorCode {
    /// Batch size or checkpoint interval of zero
    AeroBatchInvalidSize,
    /// Query, fetch, commit or release failed
    AeroBatchStoreFailed,
    /// The work unit reported failure
    AeroBatchWorkUnitFailed,
    /// A cursor was read past its end
    AeroBatchCursorMisuse,
}

impl BatchErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            BatchErrorCode::AeroBatchInvalidSize => "AERO_BATCH_INVALID_SIZE",
            BatchErrorCode::AeroBatchStoreFailed => "AERO_BATCH_STORE_FAILED",
            BatchErrorCode::AeroBatchWorkUnitFailed => "AERO_BATCH_WORK_UNIT_FAILED",
            BatchErrorCode::AeroBatchCursorMisuse => "AERO_BATCH_CURSOR_MISUSE",
        }
    }
}

impl fmt::Display for BatchErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug)]
pub struct BatchError {
    code: BatchErrorCode,
    message: String,
    /// Scan position being processed when the error occurred (1-based)
    position: Option<u64>,
    /// Positions covered by the last successful checkpoint
    durable_through: u64,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl BatchError {
    fn new(code: BatchErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            position: None,
            durable_through: 0,
            source: None,
        }
    }

    pub fn invalid_size(what: &str, value: usize) -> Self {
        Self::new(
            BatchErrorCode::AeroBatchInvalidSize,
            format!("{} must be greater than zero, got {}", what, value),
        )
    }

    pub fn store_failed(context: impl Into<String>, source: StoreError) -> Self {
        let mut err = Self::new(
            BatchErrorCode::AeroBatchStoreFailed,
            format!("{}: {}", context.into(), source),
        );
        err.source = Some(Box::new(source));
        err
    }

    pub fn work_unit_failed(record: &RecordRef, source: WorkUnitError) -> Self {
        let mut err = Self::new(
            BatchErrorCode::AeroBatchWorkUnitFailed,
            format!(
                "work unit failed on {}:{}: {}",
                record.record_type, record.id, source
            ),
        );
        err.source = Some(Box::new(source));
        err
    }

    pub fn from_cursor(source: CursorError) -> Self {
        match source {
            CursorError::Store(e) => Self::store_failed("cursor fetch failed", e),
            exhausted @ CursorError::Exhausted { .. } => {
                let mut err =
                    Self::new(BatchErrorCode::AeroBatchCursorMisuse, exhausted.to_string());
                err.source = Some(Box::new(exhausted));
                err
            }
        }
    }

    /// Attach run progress at the point of failure
    pub fn at(mut self, position: u64, durable_through: u64) -> Self {
        self.position = Some(position);
        self.durable_through = durable_through;
        self
    }

    pub fn code(&self) -> BatchErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> Option<u64> {
        self.position
    }

    pub fn durable_through(&self) -> u64 {
        self.durable_through
    }

    /// Work unit failure as raised, if that is what aborted the run
    pub fn work_unit_error(&self) -> Option<&WorkUnitError> {
        self.source.as_ref()?.downcast_ref::<WorkUnitError>()
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code, self.message)?;
        if let Some(position) = self.position {
            write!(
                f,
                " (position {}, durable through {})",
                position, self.durable_through
            )?;
        }
        Ok(())
    }
}

impl StdError for BatchError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<CursorError> for BatchError {
    fn from(e: CursorError) -> Self {
        Self::from_cursor(e)
    }
}

impl From<StoreError> for BatchError {
    fn from(e: StoreError) -> Self {
        Self::store_failed("store operation failed", e)
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
