//! Query dispatch for syncdb
//!
//! `QueryDispatcher` is the single entry point for channel, sequence and
//! access queries. It owns one `QueryPath` chosen at construction (view or
//! declarative) and never switches paths afterwards.
//!
//! Per call:
//! 1. Validate the request. Rejected requests touch neither the backend nor
//!    the stats registry.
//! 2. Record `issued` on the counters for (query type, backend bucket).
//! 3. Execute through the path. A backend failure records `error` and is
//!    returned as `QueryError::BackendExecution`.
//! 4. Wrap the cursor in a `ResultIterator`, which the caller must close.

mod dispatch;
mod path;
mod results;

pub use dispatch::QueryDispatcher;
pub use path::{DeclarativePath, QueryPath, QueryRequest, ViewPath};
pub use results::ResultIterator;
