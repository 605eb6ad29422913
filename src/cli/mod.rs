//! CLI module for syncdb
//!
//! Diagnostic commands around the query layer:
//! - statement: print the request a query would send to the configured backend
//! - coverage: check whether an explain plan needed a fetch from primary storage

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, StatementQuery};
pub use commands::{coverage, execute, render, run, run_command, statement};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_response};
