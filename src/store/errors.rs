//! Record store errors

use std::io;

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure against the persistent store.
///
/// A record that vanished is not an error: `fetch_by_id` returns `None`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Query failed on '{record_type}': {reason}")]
    Query { record_type: String, reason: String },

    #[error("Fetch of {record_type}:{id} failed: {reason}")]
    Fetch {
        record_type: String,
        id: String,
        reason: String,
    },

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Release failed: {0}")]
    Release(String),

    #[error("Store file corrupt: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn query(record_type: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Query {
            record_type: record_type.into(),
            reason: reason.into(),
        }
    }

    pub fn fetch(
        record_type: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        StoreError::Fetch {
            record_type: record_type.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Corruption means the durable state cannot be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Corrupt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = StoreError::fetch("identity", "42", "connection reset");
        let display = err.to_string();
        assert!(display.contains("identity:42"));
        assert!(display.contains("connection reset"));
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(StoreError::Corrupt("bad crc".into()).is_fatal());
        assert!(!StoreError::Commit("locked".into()).is_fatal());
    }
}
