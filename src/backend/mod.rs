//! Index backend interfaces for syncdb
//!
//! Two interchangeable index backends sit behind the dispatcher:
//!
//! - `ViewStore`: MapReduce views queried by key range over
//!   `[channel, sequence]` (or `[principal]`) keys
//! - `DeclarativeStore`: secondary indexes queried by parameterized
//!   statements, with an `explain` diagnostic
//!
//! Both hand back a `RowCursor`. Cursors are pull-based and must be closed
//! by whoever holds them; `close` releases the backend resources.
//!
//! `MemoryBucket` implements both stores in memory and is the reference
//! backend used by the tests and the CLI.

mod cursor;
mod errors;
mod memory;

pub use cursor::{ChainCursor, DedupCursor, FilterCursor, LimitCursor, VecCursor};
pub use errors::{BackendError, BackendResult};
pub use memory::{DocumentMeta, DocumentUpdate, MemoryBucket};

use serde_json::Value;

use crate::declarative::{Params, Statement};
use crate::query::QueryRow;
use crate::view::ViewQuery;

/// Pull-based cursor over backend rows
pub trait RowCursor: Send {
    /// Next row, or `None` once the cursor is exhausted
    fn next_row(&mut self) -> BackendResult<Option<QueryRow>>;

    /// Release backend resources. Calling it again is a no-op.
    fn close(&mut self) -> BackendResult<()>;
}

/// Owned, type-erased cursor
pub type BoxCursor = Box<dyn RowCursor>;

/// Backend A: MapReduce view index
pub trait ViewStore: Send + Sync {
    /// Runs a key-range query. Rows come back in key order, each carrying
    /// `id`, `key` and `value`.
    fn query_view(&self, query: &ViewQuery) -> BackendResult<BoxCursor>;
}

/// Backend B: declarative secondary index
pub trait DeclarativeStore: Send + Sync {
    /// Executes a statement with its parameters
    fn query(&self, statement: &Statement, params: &Params) -> BackendResult<BoxCursor>;

    /// Returns the execution plan tree for a statement without running it
    fn explain(&self, statement: &Statement, params: &Params) -> BackendResult<Value>;
}
