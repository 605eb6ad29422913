//! Backend-specific execution paths

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::backend::{
    BackendResult, BoxCursor, ChainCursor, DeclarativeStore, DedupCursor, FilterCursor,
    LimitCursor, ViewStore,
};
use crate::declarative::{DeclarativeQueryBuilder, Params, Statement};
use crate::query::{BackendKind, ChannelQuerySpec, QueryRow, QueryType, SequenceQuerySpec};
use crate::stats::StatKey;
use crate::view::{
    row_is_active, row_is_removed, row_sequence, ViewQueryBuilder, VIEW_ACCESS, VIEW_CHANNELS,
    VIEW_ROLE_ACCESS,
};

/// A validated logical request
#[derive(Debug, Clone, Copy)]
pub enum QueryRequest<'a> {
    Channels(&'a ChannelQuerySpec),
    Sequences(&'a SequenceQuerySpec),
    Access(&'a str),
    RoleAccess(&'a str),
}

impl QueryRequest<'_> {
    pub fn query_type(&self) -> QueryType {
        match self {
            QueryRequest::Channels(_) => QueryType::Channels,
            QueryRequest::Sequences(_) => QueryType::Sequences,
            QueryRequest::Access(_) => QueryType::Access,
            QueryRequest::RoleAccess(_) => QueryType::RoleAccess,
        }
    }
}

/// Turns a logical request into a backend cursor
pub trait QueryPath: Send + Sync {
    fn backend_kind(&self) -> BackendKind;

    /// Stats bucket a query type is counted under on this path
    fn stat_key(&self, query_type: QueryType) -> StatKey;

    fn execute(&self, request: &QueryRequest<'_>) -> BackendResult<BoxCursor>;
}

/// Key-range queries against the sync views
pub struct ViewPath {
    store: Arc<dyn ViewStore>,
    builder: ViewQueryBuilder,
}

impl ViewPath {
    pub fn new(store: Arc<dyn ViewStore>, builder: ViewQueryBuilder) -> Self {
        Self { store, builder }
    }

    fn channels(&self, spec: &ChannelQuerySpec) -> BackendResult<BoxCursor> {
        let cursor = self.store.query_view(&self.builder.channels(spec))?;
        if !spec.active_only() {
            return Ok(cursor);
        }

        // The range cannot exclude removals, so the cap applies after filtering.
        let active: BoxCursor = Box::new(FilterCursor::new(cursor, row_is_active));
        Ok(match spec.effective_limit() {
            Some(limit) => Box::new(LimitCursor::new(active, limit)),
            None => active,
        })
    }

    /// Scans the star partition and the named partition, then keeps exact
    /// sequence members. Key-range bounds alone would admit rows from the
    /// other partition.
    fn sequences(&self, spec: &SequenceQuerySpec) -> BackendResult<BoxCursor> {
        let [star, named] = self.builder.sequences(spec);
        let mut star_cursor = self.store.query_view(&star)?;
        let named_cursor = match self.store.query_view(&named) {
            Ok(cursor) => cursor,
            Err(e) => {
                if let Err(close_err) = star_cursor.close() {
                    warn!(event = "CURSOR_CLOSE_FAILED", error = %close_err);
                }
                return Err(e);
            }
        };

        let members: HashSet<u64> = spec.iter().collect();
        let union = Box::new(ChainCursor::new([star_cursor, named_cursor]));
        let matching = Box::new(FilterCursor::new(union, move |row: &QueryRow| {
            !row_is_removed(row) && row_sequence(row).map_or(false, |seq| members.contains(&seq))
        }));
        Ok(Box::new(DedupCursor::new(matching, row_sequence)))
    }
}

impl QueryPath for ViewPath {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::View
    }

    fn stat_key(&self, query_type: QueryType) -> StatKey {
        let view = match query_type {
            QueryType::Channels | QueryType::Sequences => VIEW_CHANNELS,
            QueryType::Access => VIEW_ACCESS,
            QueryType::RoleAccess => VIEW_ROLE_ACCESS,
        };
        StatKey::view(query_type, self.builder.design_doc(), view)
    }

    fn execute(&self, request: &QueryRequest<'_>) -> BackendResult<BoxCursor> {
        match request {
            QueryRequest::Channels(spec) => self.channels(spec),
            QueryRequest::Sequences(spec) => self.sequences(spec),
            QueryRequest::Access(user) => self.store.query_view(&self.builder.access(user)),
            QueryRequest::RoleAccess(user) => {
                self.store.query_view(&self.builder.role_access(user))
            }
        }
    }
}

/// Parameterized statements against the secondary indexes
pub struct DeclarativePath {
    store: Arc<dyn DeclarativeStore>,
    builder: DeclarativeQueryBuilder,
}

impl DeclarativePath {
    pub fn new(store: Arc<dyn DeclarativeStore>, builder: DeclarativeQueryBuilder) -> Self {
        Self { store, builder }
    }

    /// Statement and parameters a request runs as
    pub fn build(&self, request: &QueryRequest<'_>) -> (Statement, Params) {
        match request {
            QueryRequest::Channels(spec) => self.builder.channels(spec),
            QueryRequest::Sequences(spec) => self.builder.sequences(spec),
            QueryRequest::Access(user) => (self.builder.access(user), Params::new()),
            QueryRequest::RoleAccess(user) => (self.builder.role_access(user), Params::new()),
        }
    }
}

impl QueryPath for DeclarativePath {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Declarative
    }

    fn stat_key(&self, query_type: QueryType) -> StatKey {
        StatKey::declarative(query_type)
    }

    fn execute(&self, request: &QueryRequest<'_>) -> BackendResult<BoxCursor> {
        let (statement, params) = self.build(request);
        self.store.query(&statement, &params)
    }
}
