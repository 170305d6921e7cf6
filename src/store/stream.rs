//! Store-side result handles

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::errors::StoreResult;
use super::record::Row;

/// A forward-only store-side result handle.
///
/// Must be releasable before exhaustion; dropping an open stream closes it.
pub trait RowStream {
    /// Next row, or `None` when the result set is exhausted
    fn next_row(&mut self) -> StoreResult<Option<Row>>;

    /// Release the handle. Idempotent. Later `next_row` calls return `None`.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Row stream over rows the store has already produced.
///
/// Tracks itself in a shared open-handle count so stores can report
/// handles that were never released.
#[derive(Debug)]
pub struct BufferedRowStream {
    rows: VecDeque<Row>,
    open_handles: Arc<AtomicUsize>,
    closed: bool,
}

impl BufferedRowStream {
    pub fn new(rows: impl Into<VecDeque<Row>>, open_handles: Arc<AtomicUsize>) -> Self {
        open_handles.fetch_add(1, Ordering::SeqCst);
        Self {
            rows: rows.into(),
            open_handles,
            closed: false,
        }
    }

    /// Rows not yet read
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowStream for BufferedRowStream {
    fn next_row(&mut self) -> StoreResult<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        match self.rows.pop_front() {
            Some(row) => Ok(Some(row)),
            None => {
                self.close();
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rows.clear();
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for BufferedRowStream {
    fn drop(&mut self) {
        self.close();
    }
}
