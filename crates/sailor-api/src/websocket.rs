//! WebSocket event stream with auto-reconnect.
//!
//! Connects to the server's event socket and publishes every parsed
//! [`ResourceMessage`] into an [`EventHub`], which fans them out per
//! resource. Reconnects with exponential backoff + jitter automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sailor_api::{EventHub, websocket::{EventStreamHandle, ReconnectConfig}};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let hub = Arc::new(EventHub::new());
//! let mut tasks = hub.subscribe("task");
//! let ws_url = Url::parse("ws://localhost:1337/events")?;
//!
//! let handle = EventStreamHandle::connect(
//!     ws_url,
//!     ReconnectConfig::default(),
//!     CancellationToken::new(),
//!     Arc::clone(&hub),
//!     None,
//! );
//! while let Ok(msg) = tasks.recv().await {
//!     println!("{} {:?}", msg.verb, msg.id);
//! }
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::hub::EventHub;
use crate::message::ResourceMessage;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── EventStreamHandle ────────────────────────────────────────────────

/// Handle to a running event stream task.
///
/// Call [`shutdown`](Self::shutdown) to tear down the background task.
pub struct EventStreamHandle {
    cancel: CancellationToken,
}

impl EventStreamHandle {
    /// Spawn the connect/reconnect loop.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. `authorization` is sent verbatim as the
    /// `Authorization` header of the upgrade request.
    pub fn connect(
        ws_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        hub: Arc<EventHub>,
        authorization: Option<String>,
    ) -> Self {
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(ws_url, hub, reconnect, task_cancel, authorization).await;
        });

        Self { cancel }
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn ws_loop(
    ws_url: Url,
    hub: Arc<EventHub>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    authorization: Option<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &hub, &cancel, authorization.as_deref()) => {
                match result {
                    // Clean disconnect: reset attempt counter and reconnect immediately.
                    Ok(()) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        tracing::info!("event socket disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "event socket error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "event socket reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    tracing::debug!("event socket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single WebSocket connection, read messages until it drops.
async fn connect_and_read(
    url: &Url,
    hub: &EventHub,
    cancel: &CancellationToken,
    authorization: Option<&str>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to event socket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(value) = authorization {
        request = request.with_header("Authorization", value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("event socket connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_publish(&text, hub);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("event socket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            if cf.code != tungstenite::protocol::frame::coding::CloseCode::Normal {
                                return Err(Error::WebSocketClosed {
                                    code: cf.code.into(),
                                    reason: cf.reason.to_string(),
                                });
                            }
                        }
                        tracing::info!("event socket close frame received");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("event socket stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse one text frame into a [`ResourceMessage`].
///
/// Two shapes are accepted:
/// - `{"model": "task", "verb": "created", "id": .., "data": ..}`
/// - `["task", {"verb": "created", "id": .., "data": ..}]` (event name first)
fn parse_frame(text: &str) -> Result<ResourceMessage, String> {
    let raw: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;

    match raw {
        Value::Array(mut parts) if parts.len() == 2 => {
            let payload = parts.pop().unwrap_or(Value::Null);
            let Some(model) = parts.pop().and_then(|m| m.as_str().map(str::to_owned)) else {
                return Err("event name must be a string".into());
            };
            let mut msg: ResourceMessage =
                serde_json::from_value(payload).map_err(|e| e.to_string())?;
            msg.model = model;
            Ok(msg)
        }
        Value::Object(_) => {
            let msg: ResourceMessage = serde_json::from_value(raw).map_err(|e| e.to_string())?;
            if msg.model.is_empty() {
                return Err("message has no model".into());
            }
            Ok(msg)
        }
        _ => Err("unsupported frame shape".into()),
    }
}

/// Parse a text frame and publish it, logging and skipping bad frames.
fn parse_and_publish(text: &str, hub: &EventHub) {
    match parse_frame(text) {
        Ok(msg) => {
            tracing::trace!(model = %msg.model, verb = %msg.verb, "event received");
            hub.publish(msg);
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse event frame");
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
