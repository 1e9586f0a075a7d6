// ── Server-pushed resource messages ──

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

/// What happened to a record on the server.
///
/// Unknown verbs survive parsing as [`Verb::Unknown`] so the router can
/// drop them explicitly instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(from = "String", into = "String")]
pub enum Verb {
    Created,
    Updated,
    Destroyed,
    #[strum(default)]
    Unknown(String),
}

impl From<String> for Verb {
    fn from(raw: String) -> Self {
        raw.parse().unwrap_or(Self::Unknown(raw))
    }
}

impl From<Verb> for String {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Unknown(raw) => raw,
            known => known.as_ref().to_owned(),
        }
    }
}

/// One change notification for a resource.
///
/// `model` names the resource; `id` identifies the record for
/// `updated`/`destroyed`; `data` carries the record (or the changed
/// fields) for `created`/`updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMessage {
    #[serde(default)]
    pub model: String,
    pub verb: Verb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
}

impl ResourceMessage {
    pub fn new(model: impl Into<String>, verb: Verb) -> Self {
        Self {
            model: model.into(),
            verb,
            id: None,
            data: None,
            previous: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The record identifier: the explicit `id`, or `data.id` as a fallback.
    pub fn record_id(&self) -> Option<&Value> {
        self.id
            .as_ref()
            .filter(|v| !v.is_null())
            .or_else(|| self.data.as_ref().and_then(|d| d.get("id")))
    }
}
