// Transport abstraction and shared HTTP client configuration.
//
// The core only ever talks to `dyn Transport`. The HTTP implementation
// builds its `reqwest::Client` from `TransportConfig`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Error;
use crate::message::ResourceMessage;

/// Request/response and event-subscription channel to the backend.
///
/// Paths are absolute resource paths (see [`crate::ResourcePath`]).
/// Responses are raw JSON; interpreting `{"error": ..}` payloads is
/// left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read a resource, optionally filtered by `params` (a JSON object).
    async fn get(&self, path: &str, params: &Value) -> Result<Value, Error>;

    async fn post(&self, path: &str, body: &Value) -> Result<Value, Error>;

    async fn put(&self, path: &str, body: &Value) -> Result<Value, Error>;

    async fn delete(&self, path: &str, params: &Value) -> Result<Value, Error>;

    /// Subscribe to server-pushed change messages for one resource.
    fn subscribe(&self, resource: &str) -> broadcast::Receiver<Arc<ResourceMessage>>;
}

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed development servers).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<SecretString>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            auth_token: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("sailor/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        if let Some(headers) = self.default_headers()? {
            builder = builder.default_headers(headers);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    fn default_headers(&self) -> Result<Option<HeaderMap>, Error> {
        let Some(token) = &self.auth_token else {
            return Ok(None);
        };
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| Error::InvalidAuthToken(e.to_string()))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(Some(headers))
    }
}
