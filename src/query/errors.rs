//! Query error types
//!
//! Error codes:
//! - SYNCDB_QUERY_INVALID (rejected before the backend is touched)
//! - SYNCDB_QUERY_BACKEND_FAILED (counted as issued and errored)
//! - SYNCDB_QUERY_ITERATION_FAILED (cursor failure after a successful execute)

use std::fmt;

use thiserror::Error;

use crate::backend::BackendError;

use super::types::{BackendKind, QueryType};

/// Stable codes for query errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    QueryInvalid,
    BackendFailed,
    IterationFailed,
}

impl QueryErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::QueryInvalid => "SYNCDB_QUERY_INVALID",
            QueryErrorCode::BackendFailed => "SYNCDB_QUERY_BACKEND_FAILED",
            QueryErrorCode::IterationFailed => "SYNCDB_QUERY_ITERATION_FAILED",
        }
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the query API. No retries happen below this type.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid {query_type} query: {reason}")]
    Validation {
        query_type: QueryType,
        reason: String,
    },

    #[error("{query_type} query failed on {backend} backend: {source}")]
    BackendExecution {
        query_type: QueryType,
        backend: BackendKind,
        #[source]
        source: BackendError,
    },

    #[error("{query_type} result iteration failed: {source}")]
    Iteration {
        query_type: QueryType,
        #[source]
        source: BackendError,
    },
}

impl QueryError {
    pub fn validation(query_type: QueryType, reason: impl Into<String>) -> Self {
        QueryError::Validation {
            query_type,
            reason: reason.into(),
        }
    }

    pub fn backend(query_type: QueryType, backend: BackendKind, source: BackendError) -> Self {
        QueryError::BackendExecution {
            query_type,
            backend,
            source,
        }
    }

    pub fn iteration(query_type: QueryType, source: BackendError) -> Self {
        QueryError::Iteration { query_type, source }
    }

    pub fn code(&self) -> QueryErrorCode {
        match self {
            QueryError::Validation { .. } => QueryErrorCode::QueryInvalid,
            QueryError::BackendExecution { .. } => QueryErrorCode::BackendFailed,
            QueryError::Iteration { .. } => QueryErrorCode::IterationFailed,
        }
    }

    pub fn query_type(&self) -> QueryType {
        match self {
            QueryError::Validation { query_type, .. }
            | QueryError::BackendExecution { query_type, .. }
            | QueryError::Iteration { query_type, .. } => *query_type,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation { .. })
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, QueryError::BackendExecution { .. })
    }

    pub fn is_iteration(&self) -> bool {
        matches!(self, QueryError::Iteration { .. })
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_codes() {
        assert_eq!(QueryErrorCode::QueryInvalid.code(), "SYNCDB_QUERY_INVALID");
        assert_eq!(
            QueryErrorCode::BackendFailed.code(),
            "SYNCDB_QUERY_BACKEND_FAILED"
        );
        assert_eq!(
            QueryErrorCode::IterationFailed.code(),
            "SYNCDB_QUERY_ITERATION_FAILED"
        );
    }

    #[test]
    fn test_backend_error_keeps_cause() {
        let err = QueryError::backend(
            QueryType::Channels,
            BackendKind::View,
            BackendError::Unavailable("connection refused".into()),
        );
        assert!(err.is_backend());
        assert_eq!(err.code(), QueryErrorCode::BackendFailed);
        assert!(err.source().is_some());

        let display = err.to_string();
        assert!(display.contains("channels"));
        assert!(display.contains("view"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn test_validation_display() {
        let err = QueryError::validation(QueryType::Sequences, "sequence set must not be empty");
        assert_eq!(err.query_type(), QueryType::Sequences);
        assert!(err.to_string().contains("must not be empty"));
    }
}
