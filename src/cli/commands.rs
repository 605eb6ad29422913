//! CLI command implementations

use std::path::Path;

use serde_json::{json, Value};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::coverage::{check_plan, load_plan};
use crate::declarative::Params;
use crate::query::{
    BackendKind, ChannelQuerySpec, QueryError, QueryResult, QueryType, SequenceQuerySpec,
};

use super::args::{Command, StatementQuery};
use super::errors::CliResult;
use super::io::{error_response, response, write_error, write_response};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args.
///
/// Failures are written as a JSON error object before being returned.
pub fn run_command(cmd: Command) -> CliResult<()> {
    match execute(cmd) {
        Ok(output) => write_response(output),
        Err(e) => {
            write_error(e.code(), &e.to_string())?;
            Err(e)
        }
    }
}

/// Run a command and return its `data` payload
pub fn execute(cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Statement { config, query } => statement(&config, &query),
        Command::Coverage { plan } => coverage(&plan),
    }
}

/// The JSON object `run_command` writes for an outcome
pub fn render(outcome: &CliResult<Value>) -> Value {
    match outcome {
        Ok(data) => response(data.clone()),
        Err(e) => error_response(e.code(), &e.to_string()),
    }
}

fn require_non_empty(query_type: QueryType, what: &str, value: &str) -> QueryResult<()> {
    if value.is_empty() {
        return Err(QueryError::validation(
            query_type,
            format!("{} must not be empty", what),
        ));
    }
    Ok(())
}

/// Builds the request a query would send to the configured backend.
///
/// Views: `{"backend": "view", "requests": [...]}`.
/// Declarative: `{"backend": "declarative", "statement", "params", "covered"}`.
pub fn statement(config_path: &Path, query: &StatementQuery) -> CliResult<Value> {
    let config = DatabaseConfig::load(config_path)?;
    info!(
        event = "STATEMENT_BUILD",
        db = %config.name,
        backend = %config.backend
    );

    let output = match config.backend {
        BackendKind::View => {
            let builder = config.view_builder();
            let requests = match query {
                StatementQuery::Channels {
                    channel,
                    since,
                    limit,
                    active_only_limit,
                } => {
                    require_non_empty(QueryType::Channels, "channel", channel)?;
                    let spec = ChannelQuerySpec::new(channel, *since, *limit, *active_only_limit);
                    vec![builder.channels(&spec)]
                }
                StatementQuery::Sequences { sequences } => {
                    let spec = SequenceQuerySpec::new(sequences.iter().copied())?;
                    builder.sequences(&spec).to_vec()
                }
                StatementQuery::Access { user } => {
                    require_non_empty(QueryType::Access, "user", user)?;
                    vec![builder.access(user)]
                }
                StatementQuery::RoleAccess { user } => {
                    require_non_empty(QueryType::RoleAccess, "user", user)?;
                    vec![builder.role_access(user)]
                }
            };
            json!({
                "backend": "view",
                "requests": requests.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
            })
        }
        BackendKind::Declarative => {
            let builder = config.declarative_builder();
            let (statement, params) = match query {
                StatementQuery::Channels {
                    channel,
                    since,
                    limit,
                    active_only_limit,
                } => {
                    require_non_empty(QueryType::Channels, "channel", channel)?;
                    let spec = ChannelQuerySpec::new(channel, *since, *limit, *active_only_limit);
                    builder.channels(&spec)
                }
                StatementQuery::Sequences { sequences } => {
                    let spec = SequenceQuerySpec::new(sequences.iter().copied())?;
                    builder.sequences(&spec)
                }
                StatementQuery::Access { user } => {
                    require_non_empty(QueryType::Access, "user", user)?;
                    (builder.access(user), Params::new())
                }
                StatementQuery::RoleAccess { user } => {
                    require_non_empty(QueryType::RoleAccess, "user", user)?;
                    (builder.role_access(user), Params::new())
                }
            };
            json!({
                "backend": "declarative",
                "statement": statement.text(),
                "params": params.to_json(),
                "covered": statement.is_covered_by_index(),
            })
        }
    };
    Ok(output)
}

/// Reads an explain plan and reports `{"covered": bool}`
pub fn coverage(plan_path: &Path) -> CliResult<Value> {
    let plan = load_plan(plan_path)?;
    let covered = check_plan(&plan)?;
    info!(event = "COVERAGE_CHECKED", plan = %plan_path.display(), covered);
    Ok(json!({ "covered": covered }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_json(temp_dir: &TempDir, name: &str, value: Value) -> std::path::PathBuf {
        let path = temp_dir.path().join(name);
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn test_statement_declarative_channels() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_json(&temp_dir, "db.json", json!({"name": "db"}));

        let output = statement(
            &config,
            &StatementQuery::Channels {
                channel: "ABC".into(),
                since: 5,
                limit: 10,
                active_only_limit: 0,
            },
        )
        .unwrap();

        assert_eq!(output["backend"], "declarative");
        assert_eq!(output["covered"], true);
        assert_eq!(output["params"]["channel"], "ABC");
        assert_eq!(output["params"]["since"], 5);
        assert!(output["statement"]
            .as_str()
            .unwrap()
            .contains("USE INDEX (`sg_channels_x1`)"));
    }

    #[test]
    fn test_statement_declarative_access_not_covered() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_json(&temp_dir, "db.json", json!({"name": "db"}));

        let output = statement(&config, &StatementQuery::Access { user: "user1".into() }).unwrap();
        assert_eq!(output["covered"], false);
        assert_eq!(output["params"], json!({}));
    }

    #[test]
    fn test_statement_view_sequences() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_json(&temp_dir, "db.json", json!({"name": "db", "backend": "view"}));

        let output = statement(
            &config,
            &StatementQuery::Sequences {
                sequences: vec![8, 3],
            },
        )
        .unwrap();

        assert_eq!(output["backend"], "view");
        let requests = output["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["startkey"], json!(["*", 3]));
        assert_eq!(requests[0]["endkey"], json!(["*", 8]));
    }

    #[test]
    fn test_statement_rejects_empty_sequences() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_json(&temp_dir, "db.json", json!({"name": "db"}));

        let err = statement(&config, &StatementQuery::Sequences { sequences: vec![] }).unwrap_err();
        assert_eq!(err.code(), "SYNCDB_QUERY_INVALID");
    }

    #[test]
    fn test_coverage_command() {
        let temp_dir = TempDir::new().unwrap();
        let covered = write_json(&temp_dir, "a.json", json!({"plan": {"#operator": "IndexScan3"}}));
        let fetched = write_json(
            &temp_dir,
            "b.json",
            json!({"plan": {"~children": [{"#operator": "Fetch"}]}}),
        );
        let malformed = write_json(&temp_dir, "c.json", json!([1, 2]));

        assert_eq!(coverage(&covered).unwrap(), json!({"covered": true}));
        assert_eq!(coverage(&fetched).unwrap(), json!({"covered": false}));
        assert_eq!(
            coverage(&malformed).unwrap_err().code(),
            "SYNCDB_COVERAGE_MALFORMED_PLAN"
        );
    }

    #[test]
    fn test_malformed_plan_renders_error_object() {
        let temp_dir = TempDir::new().unwrap();
        let plan = write_json(&temp_dir, "plan.json", json!("not a plan"));

        let outcome = execute(Command::Coverage { plan });
        assert!(outcome.is_err());

        let rendered = render(&outcome);
        assert_eq!(rendered["status"], "error");
        assert_eq!(rendered["code"], "SYNCDB_COVERAGE_MALFORMED_PLAN");
        assert!(!rendered["message"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_missing_config_renders_error_object() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = execute(Command::Statement {
            config: temp_dir.path().join("missing.json"),
            query: StatementQuery::Access { user: "user1".into() },
        });

        let rendered = render(&outcome);
        assert_eq!(rendered["status"], "error");
        assert_eq!(rendered["code"], "SYNCDB_CONFIG_READ_FAILED");
    }

    #[test]
    fn test_success_renders_data() {
        let temp_dir = TempDir::new().unwrap();
        let plan = write_json(&temp_dir, "plan.json", json!({"#operator": "IndexScan3"}));

        let rendered = render(&execute(Command::Coverage { plan }));
        assert_eq!(rendered, json!({"status": "ok", "data": {"covered": true}}));
    }
}
