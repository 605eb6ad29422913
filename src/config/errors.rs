//! Configuration errors

use thiserror::Error;

/// Configuration failures. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ConfigError::Invalid(reason.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "SYNCDB_CONFIG_READ_FAILED",
            ConfigError::Parse(_) => "SYNCDB_CONFIG_PARSE_FAILED",
            ConfigError::Invalid(_) => "SYNCDB_CONFIG_INVALID",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
