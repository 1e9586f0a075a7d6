//! Shared configuration for sailor tools.
//!
//! TOML profiles, auth token resolution (env + plaintext), and
//! translation to `sailor_core::SailorConfig`. The CLI layers its own
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use sailor_core::{SailorConfig, TlsVerification};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in configuration")]
    ProfileNotFound { name: String },

    #[error("no auth token available for profile '{profile}' (checked ${env})")]
    NoCredentials { profile: String, env: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Open the event socket for live updates.
    #[serde(default = "default_live")]
    pub live: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
            live: default_live(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_live() -> bool {
    true
}

/// A named backend profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// HTTP base URL (e.g., "http://localhost:1337").
    pub server: String,

    /// Event socket URL. Derived from `server` when absent.
    pub socket: Option<String>,

    /// Override the live-updates default.
    pub live: Option<bool>,

    /// Bearer token (plaintext; prefer `auth_token_env`).
    pub auth_token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub auth_token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Give up on the event socket after this many reconnects.
    pub max_reconnects: Option<u32>,
}

impl Config {
    /// Resolve the active profile name: explicit choice, then the
    /// configured default, then `"default"`.
    pub fn active_profile_name(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }

    /// Build a `SailorConfig` for a named profile, applying `[defaults]`
    /// where the profile is silent.
    pub fn sailor_config(&self, name: &str) -> Result<SailorConfig, ConfigError> {
        self.resolve(self.profile(name)?, name)
    }

    /// Like [`Config::sailor_config`] for a profile that may have been
    /// adjusted by the caller (e.g. with command-line overrides).
    pub fn resolve(&self, profile: &Profile, name: &str) -> Result<SailorConfig, ConfigError> {
        let mut config = profile_to_sailor_config(profile, name)?;

        if profile.timeout.is_none() {
            config.timeout = Duration::from_secs(self.defaults.timeout);
        }
        if profile.insecure.is_none() && self.defaults.insecure {
            config.tls = TlsVerification::DangerAcceptInvalid;
        }
        if profile.live.is_none() && !self.defaults.live {
            config.websocket_url = None;
        }
        Ok(config)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "sailor", "sailor").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sailor");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from a specific file + environment.
///
/// Environment keys nest on a double underscore:
/// `SAILOR_DEFAULTS__TIMEOUT=5` sets `defaults.timeout`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SAILOR_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve the bearer token for a profile.
///
/// A profile that names `auth_token_env` must find a token somewhere;
/// a profile without any token settings talks to the backend anonymously.
pub fn resolve_auth_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<SecretString>, ConfigError> {
    // 1. Profile's auth_token_env → env var lookup
    if let Some(ref env_name) = profile.auth_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(Some(SecretString::from(val)));
        }
    }

    // 2. Plaintext in config
    if let Some(ref token) = profile.auth_token {
        return Ok(Some(SecretString::from(token.clone())));
    }

    match profile.auth_token_env {
        Some(ref env) => Err(ConfigError::NoCredentials {
            profile: profile_name.into(),
            env: env.clone(),
        }),
        None => Ok(None),
    }
}

/// Build a `SailorConfig` from a profile with no flag overrides.
pub fn profile_to_sailor_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<SailorConfig, ConfigError> {
    let url = parse_url("server", &profile.server)?;
    let mut config = SailorConfig::new(url);

    config.auth_token = resolve_auth_token(profile, profile_name)?;

    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or_else(default_timeout));

    config.websocket_url = if profile.live.unwrap_or(true) {
        match profile.socket {
            Some(ref socket) => Some(parse_url("socket", socket)?),
            None => config.derived_websocket_url(),
        }
    } else {
        None
    };
    config.reconnect.max_retries = profile.max_reconnects;

    Ok(config)
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}
