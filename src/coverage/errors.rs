//! Coverage diagnostic errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("plan root must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("failed to read plan: {0}")]
    Read(#[from] std::io::Error),

    #[error("plan is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CoverageError {
    pub fn code(&self) -> &'static str {
        match self {
            CoverageError::NotAnObject(_) => "SYNCDB_COVERAGE_MALFORMED_PLAN",
            CoverageError::Read(_) => "SYNCDB_COVERAGE_READ_FAILED",
            CoverageError::Parse(_) => "SYNCDB_COVERAGE_PARSE_FAILED",
        }
    }
}

pub type CoverageResult<T> = Result<T, CoverageError>;
