//! Cooperative termination signal
//!
//! A supervisor requests a stop; long scans poll the flag between records.
//! Nothing is ever interrupted mid-call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clonable handle to a shared stop request
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag {
    requested: Arc<AtomicBool>,
}

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this flag to stop at its next poll
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the flag can be reused for another run
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = TerminationFlag::new();
        let supervisor = flag.clone();
        assert!(!flag.is_requested());

        supervisor.request();
        assert!(flag.is_requested());

        flag.reset();
        assert!(!supervisor.is_requested());
    }

    #[test]
    fn test_request_from_another_thread() {
        let flag = TerminationFlag::new();
        let remote = flag.clone();
        std::thread::spawn(move || remote.request()).join().unwrap();
        assert!(flag.is_requested());
    }
}
