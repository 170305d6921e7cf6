//! Observable events
//!
//! Every log line the engine emits names one of these.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    ConfigLoaded,

    // Store
    StoreLoaded,
    StorePersisted,

    // Identifier collection
    IdCollectComplete,
    /// Termination cut a collection short
    IdCollectTruncated,

    // Cursor
    /// A snapshot identifier no longer resolved
    CursorStaleSkipped,

    // Batch runs
    RunBegin,
    Checkpoint,
    Flush,
    RunComplete,
    RunTerminated,
    RunAborted,

    // Counter-driven checkpoints
    CounterCheckpoint,

    // Bulk removal
    RemoveComplete,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::StoreLoaded => "STORE_LOADED",
            Event::StorePersisted => "STORE_PERSISTED",
            Event::IdCollectComplete => "ID_COLLECT_COMPLETE",
            Event::IdCollectTruncated => "ID_COLLECT_TRUNCATED",
            Event::CursorStaleSkipped => "CURSOR_STALE_SKIPPED",
            Event::RunBegin => "BATCH_RUN_BEGIN",
            Event::Checkpoint => "BATCH_CHECKPOINT",
            Event::Flush => "BATCH_FLUSH",
            Event::RunComplete => "BATCH_RUN_COMPLETE",
            Event::RunTerminated => "BATCH_RUN_TERMINATED",
            Event::RunAborted => "BATCH_RUN_ABORTED",
            Event::CounterCheckpoint => "COUNTER_CHECKPOINT",
            Event::RemoveComplete => "REMOVE_COMPLETE",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::CursorStaleSkipped | Event::CounterCheckpoint | Event::StorePersisted => {
                Severity::Trace
            }
            Event::IdCollectTruncated | Event::RunTerminated => Severity::Warn,
            Event::RunAborted => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake() {
        let events = [
            Event::ConfigLoaded,
            Event::StoreLoaded,
            Event::StorePersisted,
            Event::IdCollectComplete,
            Event::IdCollectTruncated,
            Event::CursorStaleSkipped,
            Event::RunBegin,
            Event::Checkpoint,
            Event::Flush,
            Event::RunComplete,
            Event::RunTerminated,
            Event::RunAborted,
            Event::CounterCheckpoint,
            Event::RemoveComplete,
        ];
        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_severities() {
        assert_eq!(Event::RunAborted.severity(), Severity::Error);
        assert_eq!(Event::RunTerminated.severity(), Severity::Warn);
        assert_eq!(Event::CursorStaleSkipped.severity(), Severity::Trace);
        assert_eq!(Event::Checkpoint.severity(), Severity::Info);
    }
}
