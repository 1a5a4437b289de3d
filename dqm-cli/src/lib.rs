//! Library module for the `dqm` binary.
//!
//! The argument model and command dispatch live here so they can be driven
//! from tests; `main.rs` only parses arguments, sets up logging and prints.

pub mod app;
pub mod commands;
pub mod output;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use uuid::Uuid;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "dqm")]
#[command(about = "Data quality monitor")]
#[command(version)]
#[command(long_about = "
dqm - rule-based data quality monitoring

Profiles tables, runs data quality rules and scores the results along the
DAMA quality dimensions. Every command prints JSON.

SECURITY FEATURES:
- Table and column names are checked against the live schema
- Filter values are always bound parameters
- Read-only database operations only
- Credentials are never printed or logged

SUPPORTED DATABASES:
- PostgreSQL
- SQLite

EXAMPLES:
  dqm --connections conns.json connections test
  dqm --store .dqm profile customers --suggest
  dqm query customers --columns id,email --filter status=active --limit 20
  dqm --store .dqm rules create --name email_present --table customers --column email --kind null_check
  dqm --store .dqm rules run
  dqm --store .dqm dama alerts --threshold 80
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub sources: SourceArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Logging and output options
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all logging except errors")]
    pub quiet: bool,

    /// Output file path
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Write the JSON result to a file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

/// Where configuration, connections and state come from
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Configuration file
    #[arg(long, global = true, env = "DQM_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Connections file
    #[arg(
        long,
        global = true,
        env = "DQM_CONNECTIONS",
        value_name = "FILE",
        help = "JSON list of connections, added to those in --config"
    )]
    pub connections: Option<PathBuf>,

    /// State directory
    #[arg(
        long,
        global = true,
        env = "DQM_STORE",
        value_name = "DIR",
        help = "Directory holding rules, execution history and profiles (in-memory when omitted)"
    )]
    pub store: Option<PathBuf>,

    /// Active connection
    #[arg(
        short = 'c',
        long,
        global = true,
        value_name = "NAME",
        help = "Connection to make active before running the command"
    )]
    pub connection: Option<String>,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage and test connections
    #[command(subcommand)]
    Connections(ConnectionsCommand),
    /// List tables on the active connection
    Tables,
    /// Profile the columns of a table
    Profile(ProfileArgs),
    /// Select rows from a table with validated columns and bound filters
    Query(QueryArgs),
    /// Show stored profiles
    ProfileHistory {
        /// Only profiles of this table
        #[arg(long)]
        table: Option<String>,
    },
    /// Manage and execute rules
    #[command(subcommand)]
    Rules(RulesCommand),
    /// DAMA dimension scores, trends and alerts
    #[command(subcommand)]
    Dama(DamaCommand),
}

/// Connection commands
#[derive(Debug, Subcommand)]
pub enum ConnectionsCommand {
    /// List configured connections without credentials
    List,
    /// Probe a connection (the active one by default)
    Test {
        /// Connection name
        name: Option<String>,
    },
}

/// Arguments for `profile`
#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Table to profile
    pub table: String,

    /// Columns to profile (all when omitted)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Regular expression to count matches for
    #[arg(long)]
    pub pattern: Option<String>,

    /// Include rule suggestions in the output
    #[arg(long)]
    pub suggest: bool,

    /// Create every suggested rule
    #[arg(long, requires = "suggest")]
    pub accept: bool,
}

/// Arguments for `query`
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Table to read
    pub table: String,

    /// Columns to return (all when omitted)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Equality filter as column=value; the value is parsed as JSON when possible
    #[arg(long = "filter", value_name = "COLUMN=VALUE", value_parser = parse_parameter)]
    pub filters: Vec<(String, JsonValue)>,

    /// Maximum rows to return
    #[arg(long, default_value_t = 100)]
    pub limit: u32,
}

/// Rule commands
#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// Create a rule
    Create(CreateRuleArgs),
    /// Change a rule
    Update(UpdateRuleArgs),
    /// List rules
    List {
        /// Include inactive rules
        #[arg(long)]
        all: bool,
    },
    /// Show one rule
    Show {
        /// Rule id
        id: Uuid,
    },
    /// Activate an inactive rule
    Activate {
        /// Rule id
        id: Uuid,
    },
    /// Deactivate an active rule
    Deactivate {
        /// Rule id
        id: Uuid,
    },
    /// Delete an active rule
    Delete {
        /// Rule id
        id: Uuid,
    },
    /// Execute rules (every active rule when no id is given)
    Run {
        /// Rule ids
        ids: Vec<Uuid>,
    },
    /// Query execution history
    Results(ResultsArgs),
    /// Failing rows sampled by one execution
    Failures {
        /// Execution result id
        result_id: Uuid,
    },
}

/// Arguments for `rules create`
#[derive(Debug, Args)]
pub struct CreateRuleArgs {
    /// Rule name
    #[arg(long)]
    pub name: String,

    /// Target table
    #[arg(long)]
    pub table: String,

    /// Target column
    #[arg(long)]
    pub column: Option<String>,

    /// Rule kind (null_check, uniqueness_check, range_check, pattern_check,
    /// foreign_key_check or a custom kind)
    #[arg(long)]
    pub kind: String,

    /// Rule parameter as key=value; the value is parsed as JSON when possible
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_parameter)]
    pub parameters: Vec<(String, JsonValue)>,

    /// Severity
    #[arg(long, default_value = "medium")]
    pub severity: dqm_core::Severity,

    /// Connection the rule targets (the active connection when omitted)
    #[arg(long)]
    pub on: Option<String>,
}

/// Arguments for `rules update`
#[derive(Debug, Args)]
pub struct UpdateRuleArgs {
    /// Rule id
    pub id: Uuid,

    /// New name
    #[arg(long)]
    pub name: Option<String>,

    /// New table
    #[arg(long)]
    pub table: Option<String>,

    /// New column
    #[arg(long, conflicts_with = "clear_column")]
    pub column: Option<String>,

    /// Remove the column
    #[arg(long)]
    pub clear_column: bool,

    /// New kind
    #[arg(long)]
    pub kind: Option<String>,

    /// Replacement parameters as key=value
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_parameter)]
    pub parameters: Vec<(String, JsonValue)>,

    /// New severity
    #[arg(long)]
    pub severity: Option<dqm_core::Severity>,
}

/// Arguments for `rules results`
#[derive(Debug, Args)]
pub struct ResultsArgs {
    /// Only results of this rule
    #[arg(long)]
    pub rule: Option<Uuid>,

    /// Only results of this rule kind
    #[arg(long)]
    pub kind: Option<String>,

    /// Only results for this table
    #[arg(long)]
    pub table: Option<String>,

    /// First day to include (YYYY-MM-DD, UTC)
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// First day to exclude (YYYY-MM-DD, UTC)
    #[arg(long)]
    pub until: Option<NaiveDate>,
}

/// DAMA commands
#[derive(Debug, Subcommand)]
pub enum DamaCommand {
    /// Score per dimension across all tables
    Overview,
    /// Score per dimension for each table
    Tables {
        /// Only this table
        #[arg(long)]
        table: Option<String>,
    },
    /// Daily scores for recent days
    Trends {
        /// Number of days with history to include
        #[arg(long, default_value_t = 30)]
        days: usize,
    },
    /// The DAMA dimensions and the rule kinds that map to them
    Dimensions,
    /// Table dimensions scoring below the threshold
    Alerts {
        /// Alert threshold (0-100); the configured threshold when omitted
        #[arg(long)]
        threshold: Option<f64>,
    },
}

/// Parses `key=value`, reading the value as JSON and falling back to a
/// plain string.
///
/// # Errors
/// Returns an error if there is no `=` or the key is empty.
pub fn parse_parameter(raw: &str) -> Result<(String, JsonValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter key in '{}'", raw));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Runs a parsed command and returns its JSON result.
///
/// # Errors
/// Returns error if the configuration cannot be loaded or the command fails.
pub async fn run(cli: &Cli) -> anyhow::Result<JsonValue> {
    let app = app::App::from_sources(&cli.sources).await?;
    let result = commands::dispatch(&app, &cli.command).await;
    app.shutdown().await;
    result
}
