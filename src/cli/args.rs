//! CLI argument definitions using clap
//!
//! Commands:
//! - syncdb statement <channels|sequences|access|role-access> --config <path>
//! - syncdb coverage --plan <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// syncdb - channel and sequence query diagnostics
#[derive(Parser, Debug)]
#[command(name = "syncdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the backend request built for a query
    Statement {
        /// Path to database configuration file
        #[arg(long, global = true, default_value = "./syncdb.json")]
        config: PathBuf,

        #[command(subcommand)]
        query: StatementQuery,
    },

    /// Report whether an explain plan is covered by its index
    Coverage {
        /// Path to a JSON explain plan
        #[arg(long)]
        plan: PathBuf,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum StatementQuery {
    /// Documents in a channel after a sequence
    Channels {
        /// Channel name, `*` for documents without a named channel
        #[arg(long)]
        channel: String,

        /// Exclusive lower sequence bound
        #[arg(long, default_value_t = 0)]
        since: u64,

        /// Row cap, 0 = unbounded
        #[arg(long, default_value_t = 0)]
        limit: u64,

        /// Cap on active rows, 0 = disabled
        #[arg(long, default_value_t = 0)]
        active_only_limit: u64,
    },

    /// Documents whose current sequence is in a set
    Sequences {
        /// Sequence numbers, comma separated
        #[arg(long = "seq", value_delimiter = ',')]
        sequences: Vec<u64>,
    },

    /// Documents granting channel access to a user
    Access {
        #[arg(long)]
        user: String,
    },

    /// Documents granting roles to a user
    RoleAccess {
        #[arg(long)]
        user: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statement_channels() {
        let cli = Cli::try_parse_from([
            "syncdb", "statement", "channels", "--channel", "ABC", "--limit", "10", "--config",
            "db.json",
        ])
        .unwrap();
        match cli.command {
            Command::Statement { config, query } => {
                assert_eq!(config, PathBuf::from("db.json"));
                assert_eq!(
                    query,
                    StatementQuery::Channels {
                        channel: "ABC".into(),
                        since: 0,
                        limit: 10,
                        active_only_limit: 0,
                    }
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_sequences_list() {
        let cli = Cli::try_parse_from(["syncdb", "statement", "sequences", "--seq", "3,4,6"])
            .unwrap();
        match cli.command {
            Command::Statement { query, .. } => assert_eq!(
                query,
                StatementQuery::Sequences {
                    sequences: vec![3, 4, 6]
                }
            ),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_coverage_requires_plan() {
        assert!(Cli::try_parse_from(["syncdb", "coverage"]).is_err());
        assert!(Cli::try_parse_from(["syncdb", "coverage", "--plan", "p.json"]).is_ok());
    }
}
