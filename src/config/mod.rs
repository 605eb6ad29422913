//! Database configuration for syncdb
//!
//! A database is configured once, from a JSON file supplied by the
//! bootstrap collaborator. The backend choice made here is fixed for the
//! lifetime of every dispatcher built from the config.

mod database;
mod errors;

pub use database::DatabaseConfig;
pub use errors::{ConfigError, ConfigResult};
