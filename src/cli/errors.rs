//! CLI error types
//!
//! Every CLI error is fatal: it is written as a JSON error object and the
//! binary exits 1.

use thiserror::Error;

use crate::config::ConfigError;
use crate::coverage::CoverageError;
use crate::query::QueryError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Coverage(#[from] CoverageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(e) => e.code(),
            CliError::Query(e) => e.code().code(),
            CliError::Coverage(e) => e.code(),
            CliError::Io(_) => "SYNCDB_CLI_IO_ERROR",
            CliError::Json(_) => "SYNCDB_CLI_JSON_ERROR",
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
