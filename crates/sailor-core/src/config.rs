// ── Runtime connection configuration ──
//
// These types describe *how* to reach a backend. They carry credential
// data and connection tuning, but never touch disk. The CLI constructs a
// `SailorConfig` from its profile and hands it in.

use std::time::Duration;

use sailor_api::{ReconnectConfig, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed development servers).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Configuration for connecting to one backend.
///
/// Built by the CLI, passed to [`Sailor::connect`](crate::Sailor::connect).
#[derive(Debug, Clone)]
pub struct SailorConfig {
    /// HTTP base URL (e.g., `http://localhost:1337`).
    pub url: Url,
    /// Event socket URL. `None` disables live updates.
    pub websocket_url: Option<Url>,
    /// Bearer token sent with every request and the socket upgrade.
    pub auth_token: Option<SecretString>,
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// Socket reconnect backoff.
    pub reconnect: ReconnectConfig,
}

impl SailorConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            websocket_url: None,
            auth_token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Derive the conventional socket URL (`ws[s]://host/…`) from the HTTP URL.
    pub fn derived_websocket_url(&self) -> Option<Url> {
        let scheme = match self.url.scheme() {
            "https" => "wss",
            "http" => "ws",
            _ => return None,
        };
        let mut ws = self.url.clone();
        ws.set_scheme(scheme).ok()?;
        Some(ws)
    }

    pub(crate) fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
            auth_token: self.auth_token.clone(),
        }
    }
}
