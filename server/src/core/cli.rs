use clap::{Args, Parser, Subcommand};

use std::path::PathBuf;

use crate::data::postgres::SortOrder;
use crate::data::query::ParamValue;
use crate::utils::sql::is_identifier;

use super::constants::{APP_NAME_LOWER, ENV_CONFIG, ENV_POSTGRES_URL};

#[derive(Parser)]
#[command(name = APP_NAME_LOWER)]
#[command(version, about = "Membership rule query engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection URL
    #[arg(long, global = true, env = ENV_POSTGRES_URL)]
    pub postgres_url: Option<String>,

    /// Page size used when a request gives no limit
    #[arg(long, global = true)]
    pub default_limit: Option<i64>,

    /// Largest page a request may ask for
    #[arg(long, global = true)]
    pub max_limit: Option<i64>,
}

/// Rule tree, caller and paging shared by the query commands
#[derive(Args, Clone, Debug, Default)]
pub struct QueryArgs {
    /// Entity to query (contacts, callouts, responses, payments, api_keys, contact_roles)
    #[arg(long, short = 'e')]
    pub entity: String,

    /// Rule group as JSON, e.g. '{"condition":"AND","rules":[...]}'
    #[arg(long, short = 'r')]
    pub rules: Option<String>,

    /// Field to sort by
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort direction (ASC or DESC)
    #[arg(long, value_parser = parse_sort_order)]
    pub order: Option<SortOrder>,

    /// Page size, -1 for everything
    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Rows to skip
    #[arg(long)]
    pub offset: Option<i64>,

    /// Contact id the query runs as (resolves "me")
    #[arg(long = "as")]
    pub acting_as: Option<String>,

    /// Run with admin rights (requires --as)
    #[arg(long, requires = "acting_as")]
    pub admin: bool,
}

/// One `column=value` pair for a batch update
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: ParamValue,
}

/// Parse sort order from CLI string
fn parse_sort_order(s: &str) -> Result<SortOrder, String> {
    s.parse()
}

/// Parse `column=value`
///
/// `null` is NULL, anything else is text. The update casts text to the
/// target column's type, so `007` stays `007` in a text column.
fn parse_assignment(s: &str) -> Result<Assignment, String> {
    let (column, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid assignment '{}', expected column=value", s))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("Invalid assignment '{}', column is empty", s));
    }
    if !is_identifier(column) {
        return Err(format!("Invalid assignment '{}', bad column name", s));
    }

    let value = match raw {
        "null" => ParamValue::Null,
        _ => ParamValue::Text(raw.to_string()),
    };

    Ok(Assignment {
        column: column.to_string(),
        value,
    })
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Print the SQL and binds a list request compiles to
    Explain(QueryArgs),
    /// Run a paginated list request and print the page as JSON
    Fetch(QueryArgs),
    /// Update every row matching the rules
    Update {
        #[command(flatten)]
        query: QueryArgs,

        /// Column assignment, repeatable: --set status=done
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        assignments: Vec<Assignment>,

        /// Only print the statement
        #[arg(long)]
        dry_run: bool,
    },
    /// List entities with their filterable and sortable fields
    Entities,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub postgres_url: Option<String>,
    pub default_limit: Option<i64>,
    pub max_limit: Option<i64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        postgres_url: cli.postgres_url,
        default_limit: cli.default_limit,
        max_limit: cli.max_limit,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment_types() {
        let cases = [
            ("bucket=done", ParamValue::Text("done".into())),
            ("assignee_id=null", ParamValue::Null),
            ("hidden=true", ParamValue::Text("true".into())),
            ("number=12", ParamValue::Text("12".into())),
            ("note=a=b", ParamValue::Text("a=b".into())),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_assignment(input).unwrap().value, expected, "{}", input);
        }
    }

    #[test]
    fn test_parse_assignment_rejects_missing_parts() {
        assert!(parse_assignment("bucket").is_err());
        assert!(parse_assignment("=done").is_err());
        assert!(parse_assignment("item.bucket=y").is_err());
    }

    #[test]
    fn test_parse_assignment_keeps_raw_text() {
        for raw in ["007", "1e3", "-0", "12.50"] {
            let assignment = parse_assignment(&format!("bucket={}", raw)).unwrap();
            assert_eq!(assignment.value, ParamValue::Text(raw.into()));
        }
    }

    #[test]
    fn test_command_name() {
        use clap::CommandFactory;
        assert_eq!(Cli::command().get_name(), APP_NAME_LOWER);
    }

    #[test]
    fn test_fetch_args() {
        let cli = Cli::try_parse_from([
            "memberhub",
            "fetch",
            "--entity",
            "contacts",
            "--sort",
            "lastname",
            "--order",
            "desc",
            "--limit",
            "-1",
            "--as",
            "c-1",
            "--admin",
        ])
        .unwrap();
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.entity, "contacts");
        assert_eq!(args.order, Some(SortOrder::Desc));
        assert_eq!(args.limit, Some(-1));
        assert_eq!(args.acting_as.as_deref(), Some("c-1"));
        assert!(args.admin);
    }

    #[test]
    fn test_admin_requires_identity() {
        let result =
            Cli::try_parse_from(["memberhub", "explain", "--entity", "contacts", "--admin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_requires_assignment() {
        let result = Cli::try_parse_from(["memberhub", "update", "--entity", "responses"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "memberhub",
            "update",
            "--entity",
            "responses",
            "--set",
            "bucket=done",
            "--dry-run",
        ])
        .unwrap();
        let Commands::Update {
            assignments,
            dry_run,
            ..
        } = cli.command
        else {
            panic!("expected update");
        };
        assert_eq!(assignments.len(), 1);
        assert!(dry_run);
    }
}
