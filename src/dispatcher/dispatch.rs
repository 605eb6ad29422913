//! `QueryDispatcher`

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{DeclarativeStore, ViewStore};
use crate::config::DatabaseConfig;
use crate::declarative::DeclarativeQueryBuilder;
use crate::query::{
    BackendKind, ChannelQuerySpec, QueryError, QueryResult, QueryType, SequenceQuerySpec,
};
use crate::stats::{QueryCounters, StatKey, StatsRegistry};
use crate::view::ViewQueryBuilder;

use super::path::{DeclarativePath, QueryPath, QueryRequest, ViewPath};
use super::results::ResultIterator;

/// Entry point for every query against one database
pub struct QueryDispatcher {
    database: String,
    path: Box<dyn QueryPath>,
    stats: Arc<StatsRegistry>,
    /// Indexed by `QueryType::index()`
    counters: [Arc<QueryCounters>; 4],
}

impl QueryDispatcher {
    /// Dispatcher over a fixed path. Counters for every query type are
    /// registered up front.
    pub fn new(
        database: impl Into<String>,
        path: Box<dyn QueryPath>,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        let counters = QueryType::ALL.map(|query_type| stats.register(&path.stat_key(query_type)));
        let database = database.into();
        debug!(
            event = "DISPATCHER_READY",
            db = %database,
            backend = %path.backend_kind()
        );
        Self {
            database,
            path,
            stats,
            counters,
        }
    }

    /// Dispatcher for the backend named in `config`
    pub fn from_config<B>(config: &DatabaseConfig, bucket: Arc<B>, stats: Arc<StatsRegistry>) -> Self
    where
        B: ViewStore + DeclarativeStore + 'static,
    {
        let path: Box<dyn QueryPath> = match config.backend {
            BackendKind::View => Box::new(ViewPath::new(bucket, config.view_builder())),
            BackendKind::Declarative => {
                Box::new(DeclarativePath::new(bucket, config.declarative_builder()))
            }
        };
        Self::new(config.name.as_str(), path, stats)
    }

    pub fn with_view_store(
        database: impl Into<String>,
        store: Arc<dyn ViewStore>,
        design_doc: &str,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        let path = ViewPath::new(store, ViewQueryBuilder::new(design_doc));
        Self::new(database, Box::new(path), stats)
    }

    pub fn with_declarative_store(
        database: impl Into<String>,
        store: Arc<dyn DeclarativeStore>,
        keyspace: &str,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        let path = DeclarativePath::new(store, DeclarativeQueryBuilder::new(keyspace));
        Self::new(database, Box::new(path), stats)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.path.backend_kind()
    }

    /// Registry the dispatcher reports to
    pub fn stats(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    /// Stats key a query type is counted under
    pub fn stat_key(&self, query_type: QueryType) -> StatKey {
        self.path.stat_key(query_type)
    }

    /// Documents in `channel_name` with sequence after `since`, ascending.
    /// `*` addresses documents without a named channel. `limit` and
    /// `active_only_limit` are caps where 0 disables the cap; a non-zero
    /// `active_only_limit` also drops removals and tombstones.
    pub fn query_channels(
        &self,
        channel_name: &str,
        since: u64,
        limit: u64,
        active_only_limit: u64,
    ) -> QueryResult<ResultIterator> {
        if channel_name.is_empty() {
            return Err(self.rejected(QueryError::validation(
                QueryType::Channels,
                "channel name must not be empty",
            )));
        }
        let spec = ChannelQuerySpec::new(channel_name, since, limit, active_only_limit);
        self.dispatch(QueryRequest::Channels(&spec))
    }

    /// Documents whose current sequence is in `sequences`, across the star
    /// and named partitions. An empty set is rejected.
    pub fn query_sequences(
        &self,
        sequences: impl IntoIterator<Item = u64>,
    ) -> QueryResult<ResultIterator> {
        let spec = SequenceQuerySpec::new(sequences).map_err(|e| self.rejected(e))?;
        self.dispatch(QueryRequest::Sequences(&spec))
    }

    /// Documents granting channel access to `username`
    pub fn query_access(&self, username: &str) -> QueryResult<ResultIterator> {
        self.check_username(QueryType::Access, username)?;
        self.dispatch(QueryRequest::Access(username))
    }

    /// Documents granting roles to `username`
    pub fn query_role_access(&self, username: &str) -> QueryResult<ResultIterator> {
        self.check_username(QueryType::RoleAccess, username)?;
        self.dispatch(QueryRequest::RoleAccess(username))
    }

    fn check_username(&self, query_type: QueryType, username: &str) -> QueryResult<()> {
        if username.is_empty() {
            return Err(self.rejected(QueryError::validation(
                query_type,
                "username must not be empty",
            )));
        }
        Ok(())
    }

    fn rejected(&self, err: QueryError) -> QueryError {
        debug!(
            event = "QUERY_REJECTED",
            db = %self.database,
            query_type = %err.query_type(),
            reason = %err
        );
        err
    }

    fn dispatch(&self, request: QueryRequest<'_>) -> QueryResult<ResultIterator> {
        let query_type = request.query_type();
        let backend = self.path.backend_kind();
        let counters = &self.counters[query_type.index()];

        counters.record_issued();
        debug!(
            event = "QUERY_ISSUED",
            db = %self.database,
            query_type = %query_type,
            backend = %backend
        );

        match self.path.execute(&request) {
            Ok(cursor) => Ok(ResultIterator::new(query_type, cursor)),
            Err(source) => {
                counters.record_error();
                warn!(
                    event = "QUERY_FAILED",
                    db = %self.database,
                    query_type = %query_type,
                    backend = %backend,
                    code = source.code(),
                    error = %source
                );
                Err(QueryError::backend(query_type, backend, source))
            }
        }
    }
}
