//! Backend error types
//!
//! Error codes:
//! - SYNCDB_BACKEND_UNAVAILABLE
//! - SYNCDB_BACKEND_INVALID_STATEMENT
//! - SYNCDB_BACKEND_UNKNOWN_VIEW
//! - SYNCDB_BACKEND_CURSOR_FAILED
//! - SYNCDB_BACKEND_CURSOR_CLOSED

use thiserror::Error;

/// Failures reported by an index backend or one of its cursors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    #[error("unknown view {design_doc}/{view}")]
    UnknownView { design_doc: String, view: String },

    #[error("cursor failed: {0}")]
    Cursor(String),

    #[error("cursor is closed")]
    CursorClosed,
}

impl BackendError {
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Unavailable(_) => "SYNCDB_BACKEND_UNAVAILABLE",
            BackendError::InvalidStatement(_) => "SYNCDB_BACKEND_INVALID_STATEMENT",
            BackendError::UnknownView { .. } => "SYNCDB_BACKEND_UNKNOWN_VIEW",
            BackendError::Cursor(_) => "SYNCDB_BACKEND_CURSOR_FAILED",
            BackendError::CursorClosed => "SYNCDB_BACKEND_CURSOR_CLOSED",
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
