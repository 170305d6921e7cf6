//! Record store interface
//!
//! The batch engine never owns persistence. It talks to a store through
//! `RecordStore`, and the same value doubles as the session: every cursor
//! call, work unit and checkpoint receives it explicitly.
//!
//! # Required behaviour
//!
//! - `query` returns a store-side handle that can be closed before exhaustion
//! - `fetch_by_id` returns `None` for a record that no longer exists
//! - `commit` makes pending writes durable
//! - `release` drops materialized records so memory stays bounded

mod errors;
mod file;
mod filter;
mod memory;
mod record;
mod stream;

pub use errors::{StoreError, StoreResult};
pub use file::{JsonFileStore, FORMAT_VERSION};
pub use filter::{Filter, FilterOp, Predicate};
pub use memory::{MemoryStore, StoreStats};
pub use record::{Query, Record, RecordRef, Row, ID_FIELD};
pub use stream::{BufferedRowStream, RowStream};

/// A persistent record store session.
///
/// Not safe for concurrent use; one batch run owns it for its duration.
pub trait RecordStore {
    /// Run a query, returning a forward-only row handle
    fn query(&mut self, query: &Query) -> StoreResult<Box<dyn RowStream>>;

    /// Materialize a record. `Ok(None)` if it does not exist.
    fn fetch_by_id(&mut self, record_type: &str, id: &str) -> StoreResult<Option<Record>>;

    /// Insert or replace a record (pending until commit)
    fn save(&mut self, record: Record) -> StoreResult<()>;

    /// Delete a record (pending until commit). Returns whether it existed.
    fn remove(&mut self, record_type: &str, id: &str) -> StoreResult<bool>;

    /// Durably persist pending writes
    fn commit(&mut self) -> StoreResult<()>;

    /// Detach every materialized record from the session
    fn release(&mut self) -> StoreResult<()>;

    /// Detach a single materialized record
    fn release_record(&mut self, record: &RecordRef) -> StoreResult<()>;
}
