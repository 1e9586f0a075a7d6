// ── Core error types ──
//
// User-facing errors from sailor-core. Consumers never see HTTP status
// codes or JSON parse failures directly: the `From<sailor_api::Error>`
// impl translates transport-layer errors into domain variants.

use serde_json::Value;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Lookup errors ────────────────────────────────────────────────
    #[error("The specified model does not exist: {name}")]
    UnknownModel { name: String },

    // ── Schema errors ────────────────────────────────────────────────
    #[error("Invalid schema for {model}.{field}: {reason}")]
    InvalidSchema {
        model: String,
        field: String,
        reason: String,
    },

    // ── Remote errors ────────────────────────────────────────────────
    #[error("Operation rejected by server: {message}")]
    Rejected {
        message: String,
        /// The error payload as the server sent it, when there was one.
        payload: Option<Value>,
    },

    #[error("Cannot connect to server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Server request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Entity state errors ──────────────────────────────────────────
    #[error("{model} record is detached from its collection")]
    Detached { model: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("No tokio runtime is running on this thread")]
    NoRuntime,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Build a rejection from a `{"error": ..}` response payload.
    pub(crate) fn rejected(payload: Value) -> Self {
        let message = payload
            .get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(Value::as_str)))
            .map_or_else(|| payload.to_string(), str::to_owned);
        Self::Rejected {
            message,
            payload: Some(payload),
        }
    }
}

/// Treat a successful response that carries an `error` key as a rejection.
pub fn check_response(response: Value) -> Result<Value, CoreError> {
    let is_error = response
        .as_object()
        .and_then(|o| o.get("error"))
        .is_some_and(|e| !e.is_null());
    if is_error {
        Err(CoreError::rejected(response))
    } else {
        Ok(response)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sailor_api::Error> for CoreError {
    fn from(err: sailor_api::Error) -> Self {
        match err {
            sailor_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            sailor_api::Error::Remote { status, message } => CoreError::Rejected {
                message: format!("HTTP {status}: {message}"),
                payload: None,
            },
            sailor_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            sailor_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            sailor_api::Error::InvalidAuthToken(reason) => CoreError::Config {
                message: format!("Invalid auth token: {reason}"),
            },
            sailor_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            sailor_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            sailor_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            sailor_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
