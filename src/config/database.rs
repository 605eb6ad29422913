//! `DatabaseConfig` loading and validation

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::declarative::{
    DeclarativeQueryBuilder, DEFAULT_ACCESS_INDEX, DEFAULT_CHANNELS_INDEX,
    DEFAULT_ROLE_ACCESS_INDEX,
};
use crate::query::BackendKind;
use crate::view::{ViewQueryBuilder, DEFAULT_DESIGN_DOC};

use super::errors::{ConfigError, ConfigResult};

/// Per-database query configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name (required)
    pub name: String,

    /// Active index backend (default: declarative)
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Design document holding the sync views
    #[serde(default = "default_design_doc")]
    pub design_doc: String,

    /// Keyspace for statements (default: the database name)
    #[serde(default)]
    pub keyspace: Option<String>,

    #[serde(default = "default_channels_index")]
    pub channels_index: String,

    #[serde(default = "default_access_index")]
    pub access_index: String,

    #[serde(default = "default_role_access_index")]
    pub role_access_index: String,
}

fn default_backend() -> BackendKind {
    BackendKind::Declarative
}
fn default_design_doc() -> String {
    DEFAULT_DESIGN_DOC.to_string()
}
fn default_channels_index() -> String {
    DEFAULT_CHANNELS_INDEX.to_string()
}
fn default_access_index() -> String {
    DEFAULT_ACCESS_INDEX.to_string()
}
fn default_role_access_index() -> String {
    DEFAULT_ROLE_ACCESS_INDEX.to_string()
}

/// Names rendered into statement text
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl DatabaseConfig {
    /// Config with every optional field at its default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: default_backend(),
            design_doc: default_design_doc(),
            keyspace: None,
            channels_index: default_channels_index(),
            access_index: default_access_index(),
            role_access_index: default_role_access_index(),
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: DatabaseConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name must not be empty"));
        }

        if self.design_doc.trim().is_empty() {
            return Err(ConfigError::invalid("design_doc must not be empty"));
        }

        if !is_plain_identifier(self.keyspace()) {
            return Err(ConfigError::invalid(format!(
                "keyspace '{}' must match [A-Za-z0-9_-]+",
                self.keyspace()
            )));
        }

        for (field, value) in [
            ("channels_index", &self.channels_index),
            ("access_index", &self.access_index),
            ("role_access_index", &self.role_access_index),
        ] {
            if !is_plain_identifier(value) {
                return Err(ConfigError::invalid(format!(
                    "{} '{}' must match [A-Za-z0-9_-]+",
                    field, value
                )));
            }
        }

        Ok(())
    }

    /// Keyspace statements run against
    pub fn keyspace(&self) -> &str {
        self.keyspace.as_deref().unwrap_or(&self.name)
    }

    pub fn view_builder(&self) -> ViewQueryBuilder {
        ViewQueryBuilder::new(self.design_doc.as_str())
    }

    pub fn declarative_builder(&self) -> DeclarativeQueryBuilder {
        DeclarativeQueryBuilder::new(self.keyspace()).with_indexes(
            &self.channels_index,
            &self.access_index,
            &self.role_access_index,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, config: serde_json::Value) -> std::path::PathBuf {
        let path = temp_dir.path().join("db.json");
        fs::write(&path, config.to_string()).unwrap();
        path
    }

    #[test]
    fn test_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({"name": "db"}));

        let config = DatabaseConfig::load(&path).unwrap();
        assert_eq!(config.backend, BackendKind::Declarative);
        assert_eq!(config.design_doc, "sync_gateway_2.1");
        assert_eq!(config.keyspace(), "db");
        assert_eq!(config.channels_index, "sg_channels_x1");
        assert_eq!(config.access_index, "sg_access_x1");
        assert_eq!(config.role_access_index, "sg_roleAccess_x1");
        assert_eq!(config, DatabaseConfig::new("db"));
    }

    #[test]
    fn test_config_view_backend() {
        let config = DatabaseConfig::from_json_str(
            r#"{"name": "db", "backend": "view", "design_doc": "sync_gateway_3.0"}"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::View);
        assert_eq!(config.view_builder().design_doc(), "sync_gateway_3.0");
    }

    #[test]
    fn test_config_explicit_keyspace() {
        let config =
            DatabaseConfig::from_json_str(r#"{"name": "db", "keyspace": "bucket-1"}"#).unwrap();
        assert_eq!(config.keyspace(), "bucket-1");
        assert_eq!(config.declarative_builder().keyspace(), "bucket-1");
    }

    #[test]
    fn test_config_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = DatabaseConfig::load(&temp_dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code(), "SYNCDB_CONFIG_READ_FAILED");
    }

    #[test]
    fn test_config_rejects_bad_json() {
        let err = DatabaseConfig::from_json_str("{not json").unwrap_err();
        assert_eq!(err.code(), "SYNCDB_CONFIG_PARSE_FAILED");

        let err = DatabaseConfig::from_json_str(r#"{"name": "db", "backend": "gsi"}"#).unwrap_err();
        assert_eq!(err.code(), "SYNCDB_CONFIG_PARSE_FAILED");
    }

    #[test]
    fn test_config_validation() {
        let cases = [
            json!({"name": ""}),
            json!({"name": "db", "design_doc": " "}),
            json!({"name": "db", "keyspace": "a`b"}),
            json!({"name": "db bucket"}),
            json!({"name": "db", "channels_index": ""}),
            json!({"name": "db", "access_index": "idx;drop"}),
        ];
        for case in cases {
            let err = DatabaseConfig::from_json_str(&case.to_string()).unwrap_err();
            assert_eq!(err.code(), "SYNCDB_CONFIG_INVALID", "case: {}", case);
        }
    }
}
