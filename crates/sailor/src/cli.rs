//! Clap derive structures for the `sailor` CLI.
//!
//! Defines the command tree, global flags, and shared argument types.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sailor -- query and watch models on a real-time CRUD backend
#[derive(Debug, Parser)]
#[command(
    name = "sailor",
    version,
    about = "Query, edit and watch records on a real-time CRUD backend",
    long_about = "Talks to a REST backend that announces created, updated and \n\
        destroyed records over an event socket. Records are cached per model \n\
        and filter, and kept in sync while `watch` runs.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "SAILOR_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend URL (overrides profile)
    #[arg(long, short = 's', env = "SAILOR_SERVER", global = true)]
    pub server: Option<String>,

    /// Bearer token
    #[arg(long, env = "SAILOR_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Output format [default: table, or `defaults.output` from config]
    #[arg(long, short = 'o', env = "SAILOR_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "SAILOR_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "SAILOR_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List records of a model
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one record
    Get(RecordArgs),

    /// Create a record from a JSON object
    Create(CreateArgs),

    /// Update fields of a record
    Update(UpdateArgs),

    /// Delete a record
    #[command(alias = "rm")]
    Delete(RecordArgs),

    /// Print records, then stream created/updated/removed events
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

impl Command {
    /// Whether the command needs the event socket.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Watch(_))
    }
}

// ── Record Arguments ─────────────────────────────────────────────────

/// Repeated `-f field=value` pairs.
///
/// Values are parsed as JSON when they can be (`-f done=false`,
/// `-f id=[1,2]`), otherwise taken as strings. Repeating a field
/// matches any of the given values.
#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Filter condition, `field=value` (repeatable)
    #[arg(
        long = "filter",
        short = 'f',
        value_name = "FIELD=VALUE",
        value_parser = parse_filter_pair
    )]
    pub conditions: Vec<(String, Value)>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Model name, optionally namespaced (e.g. `api/task`)
    pub model: String,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Model name
    pub model: String,

    /// Record identifier
    pub id: String,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Model name
    pub model: String,

    /// JSON object, `@path` to read a file, or `-` for stdin
    pub data: String,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Model name
    pub model: String,

    /// Record identifier
    pub id: String,

    /// JSON object of fields to change, `@path`, or `-` for stdin
    pub data: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Model name
    pub model: String,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Exit after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Print the config file path
    Path,

    /// Display current resolved configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (server, socket, live, auth_token, auth_token_env,
        /// ca_cert, insecure, timeout, max_reconnects)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_filter_pair(raw: &str) -> Result<(String, Value), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{raw}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((field.to_owned(), value))
}
