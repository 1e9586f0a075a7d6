//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use sailor_config::ConfigError;
use sailor_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to server at {url}")]
    #[diagnostic(
        code(sailor::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("No auth token available for profile '{profile}'")]
    #[diagnostic(
        code(sailor::no_credentials),
        help("Export ${env}, or pass --token / set SAILOR_TOKEN.")
    )]
    NoCredentials { profile: String, env: String },

    // ── Records ──────────────────────────────────────────────────────
    #[error("{model} '{id}' not found")]
    #[diagnostic(
        code(sailor::not_found),
        help("Run: sailor list {model} to see available records")
    )]
    NotFound { model: String, id: String },

    #[error("Server rejected the request: {message}")]
    #[diagnostic(code(sailor::rejected))]
    Rejected { message: String },

    #[error("API error: {message}")]
    #[diagnostic(code(sailor::api_error))]
    Api { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sailor::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(sailor::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: sailor config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(sailor::no_config),
        help(
            "Pass --server, set SAILOR_SERVER, or create a profile with: sailor config init\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(sailor::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(sailor::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(sailor::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(sailor::json), help("Pass a JSON object, e.g. '{{\"title\": \"x\"}}'."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } | Self::Json(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Rejected { message, .. } => CliError::Rejected { message },
            CoreError::UnknownModel { name } => CliError::Validation {
                field: "model".into(),
                reason: format!("'{name}' is not registered"),
            },
            CoreError::InvalidSchema { model, field, reason } => CliError::Validation {
                field: format!("{model}.{field}"),
                reason,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Api { message, status } => CliError::Api {
                message: match status {
                    Some(status) => format!("HTTP {status}: {message}"),
                    None => message,
                },
            },
            CoreError::Detached { model } => CliError::Api {
                message: format!("{model} record is detached from its collection"),
            },
            e @ CoreError::NoRuntime => CliError::Api {
                message: e.to_string(),
            },
            CoreError::Internal(message) => CliError::Api { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile, env } => CliError::NoCredentials { profile, env },
            other => CliError::Config(other),
        }
    }
}
