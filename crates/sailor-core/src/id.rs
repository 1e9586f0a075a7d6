// ── Record identity ──
//
// Servers hand out either auto-increment integers or opaque strings
// (e.g. Mongo ObjectIds). EntityId unifies both.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Server-assigned identifier of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    /// Read an identifier out of a JSON value.
    ///
    /// Integers and strings qualify; anything else (null, floats, objects)
    /// does not identify a record.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    /// Numeric strings become [`EntityId::Int`]; everything else stays a string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>()
            .map_or_else(|_| Self::Str(s.to_owned()), Self::Int))
    }
}

impl From<i64> for EntityId {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        id.to_json()
    }
}
