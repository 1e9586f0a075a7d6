//! CLI configuration: thin wrapper around `sailor_config` shared types.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` flag overrides (--server, --token, etc.).

use std::time::Duration;

use clap::ValueEnum;
use secrecy::SecretString;

use sailor_core::{SailorConfig, TlsVerification};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use sailor_config::{Config, Profile, config_path, load_config_or_default, save_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// Output format: flag > env > `defaults.output` > table.
pub fn output_format(global: &GlobalOpts, config: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&config.defaults.output, true).unwrap_or(OutputFormat::Table)
    })
}

/// Build a `SailorConfig` from the config file, profile, and CLI overrides.
///
/// `live` opens the event socket; one-shot commands leave it closed.
pub fn build_sailor_config(
    global: &GlobalOpts,
    config: &Config,
    live: bool,
) -> Result<SailorConfig, CliError> {
    let profile_name = active_profile_name(global, config);

    let mut resolved = match config.profiles.get(&profile_name) {
        // Profile found: apply flag overrides before resolution so a
        // --token never trips over an unset auth_token_env.
        Some(profile) => {
            let mut profile = profile.clone();
            if let Some(ref server) = global.server {
                profile.server.clone_from(server);
                profile.socket = None;
            }
            if let Some(ref token) = global.token {
                profile.auth_token = Some(token.clone());
                profile.auth_token_env = None;
            }
            config.resolve(&profile, &profile_name)?
        }

        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(config),
            });
        }

        // No profile: build from flags / env alone.
        None => {
            let server = global.server.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            let url: url::Url = server.parse().map_err(|_| CliError::Validation {
                field: "server".into(),
                reason: format!("invalid URL: {server}"),
            })?;
            let mut resolved = SailorConfig::new(url);
            resolved.websocket_url = resolved.derived_websocket_url();
            resolved.auth_token = global.token.clone().map(SecretString::from);
            resolved.timeout = Duration::from_secs(config.defaults.timeout);
            if config.defaults.insecure {
                resolved.tls = TlsVerification::DangerAcceptInvalid;
            }
            resolved
        }
    };

    if global.insecure {
        resolved.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        resolved.timeout = Duration::from_secs(timeout);
    }
    if !live {
        resolved.websocket_url = None;
    }
    Ok(resolved)
}

/// Comma-separated, sorted profile names for error help text.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}
