// HTTP request channel
//
// Wraps `reqwest::Client` with base-URL joining, `where` query encoding
// and response-body decoding. Server-pushed events arrive through the
// shared `EventHub`, fed by the WebSocket stream when one is running.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::hub::EventHub;
use crate::message::ResourceMessage;
use crate::transport::{Transport, TransportConfig};

/// Longest slice of a response body quoted in error messages.
const BODY_PREVIEW_LEN: usize = 200;

/// [`Transport`] over plain HTTP blueprint routes.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    hub: Arc<EventHub>,
}

impl HttpTransport {
    /// Create a transport for the server at `base_url`.
    pub fn new(base_url: Url, config: &TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            hub: Arc::new(EventHub::new()),
        }
    }

    /// The hub that subscribers read from. Feed it from an event stream.
    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Append a resource path (which may carry its own query) to the base URL.
    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Build a URL with a non-empty filter encoded as `where=<json>`.
    fn url_with_params(&self, path: &str, params: &Value) -> Result<Url, Error> {
        let mut url = self.url(path)?;
        if params.as_object().is_some_and(|o| !o.is_empty()) {
            url.query_pairs_mut()
                .append_pair("where", &params.to_string());
        }
        Ok(url)
    }

    // ── Response handling ────────────────────────────────────────────

    async fn decode(resp: reqwest::Response) -> Result<Value, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Remote {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, params: &Value) -> Result<Value, Error> {
        let url = self.url_with_params(path, params)?;
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        Self::decode(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, Error> {
        let url = self.url(path)?;
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::decode(resp).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value, Error> {
        let url = self.url(path)?;
        debug!("PUT {}", url);
        let resp = self
            .http
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::decode(resp).await
    }

    async fn delete(&self, path: &str, params: &Value) -> Result<Value, Error> {
        let url = self.url_with_params(path, params)?;
        debug!("DELETE {}", url);
        let resp = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::decode(resp).await
    }

    fn subscribe(&self, resource: &str) -> broadcast::Receiver<Arc<ResourceMessage>> {
        self.hub.subscribe(resource)
    }
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(BODY_PREVIEW_LEN);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Pull a readable message out of an error body.
///
/// Accepts `{"error": "..."}`, `{"error": {"message": ".."}}`,
/// `{"message": ".."}`, or falls back to a preview of the raw text.
fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return preview(body).to_owned();
    };
    let candidate = json
        .get("error")
        .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(Value::as_str)))
        .or_else(|| json.get("message").and_then(Value::as_str));
    candidate.map_or_else(|| preview(body).to_owned(), str::to_owned)
}
