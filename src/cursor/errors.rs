//! Cursor errors

use thiserror::Error;

use crate::store::StoreError;

pub type CursorResult<T> = Result<T, CursorError>;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// `next` called with no live record remaining
    #[error("cursor over '{record_type}' exhausted after {produced} records")]
    Exhausted { record_type: String, produced: usize },
}

impl CursorError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, CursorError::Exhausted { .. })
    }
}
