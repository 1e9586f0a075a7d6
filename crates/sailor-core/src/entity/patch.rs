// ── Incoming field sets ──

use std::future::Future;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use super::FieldValue;
use crate::error::CoreError;

pub(crate) type Fields = IndexMap<String, FieldValue>;

enum Incoming {
    Ready(FieldValue),
    Deferred(BoxFuture<'static, FieldValue>),
}

/// Fields to merge into a record.
///
/// Values are either known now or deferred: a deferred value is assigned
/// once its future resolves, after the rest of the update has applied.
#[derive(Default)]
pub struct Patch {
    fields: IndexMap<String, Incoming>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields of a JSON object. Any other JSON value is an empty patch.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(object) => Self::from(object),
            _ => Self::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields
            .insert(field.into(), Incoming::Ready(value.into()));
        self
    }

    /// Assign `field` when `value` resolves.
    pub fn defer<F>(mut self, field: impl Into<String>, value: F) -> Self
    where
        F: Future<Output = FieldValue> + Send + 'static,
    {
        self.fields
            .insert(field.into(), Incoming::Deferred(Box::pin(value)));
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A copy of the fields that are known now.
    pub(crate) fn ready_fields(&self) -> Fields {
        self.fields
            .iter()
            .filter_map(|(k, v)| match v {
                Incoming::Ready(value) => Some((k.clone(), value.clone())),
                Incoming::Deferred(_) => None,
            })
            .collect()
    }

    pub(crate) fn ready_value(&self, field: &str) -> Option<FieldValue> {
        match self.fields.get(field)? {
            Incoming::Ready(value) => Some(value.clone()),
            Incoming::Deferred(_) => None,
        }
    }

    pub(crate) fn split(self) -> (Fields, Vec<(String, BoxFuture<'static, FieldValue>)>) {
        let mut ready = Fields::new();
        let mut deferred = Vec::new();
        for (field, value) in self.fields {
            match value {
                Incoming::Ready(value) => {
                    ready.insert(field, value);
                }
                Incoming::Deferred(future) => deferred.push((field, future)),
            }
        }
        (ready, deferred)
    }
}

impl std::fmt::Debug for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in &self.fields {
            match value {
                Incoming::Ready(v) => map.entry(field, v),
                Incoming::Deferred(_) => map.entry(field, &"<deferred>"),
            };
        }
        map.finish()
    }
}

impl From<Map<String, Value>> for Patch {
    fn from(object: Map<String, Value>) -> Self {
        object
            .into_iter()
            .fold(Self::new(), |patch, (k, v)| patch.set(k, v))
    }
}

impl From<Value> for Patch {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl From<Fields> for Patch {
    fn from(fields: Fields) -> Self {
        fields
            .into_iter()
            .fold(Self::new(), |patch, (k, v)| patch.set(k, v))
    }
}

// ── Pending ──────────────────────────────────────────────────────────

/// Field computations still running after an update was applied.
///
/// Await [`settle`](Self::settle) to observe their results; dropping the
/// handle leaves them running.
#[derive(Debug, Default)]
pub struct Pending {
    tasks: Vec<JoinHandle<Result<(), CoreError>>>,
}

impl Pending {
    pub(crate) fn push(&mut self, task: JoinHandle<Result<(), CoreError>>) {
        self.tasks.push(task);
    }

    pub(crate) fn extend(&mut self, other: Pending) {
        self.tasks.extend(other.tasks);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Wait for every computation to finish.
    ///
    /// All of them run to completion; the first failure is returned.
    pub async fn settle(self) -> Result<(), CoreError> {
        let mut first = None;
        for task in self.tasks {
            let outcome = task
                .await
                .unwrap_or_else(|e| Err(CoreError::Internal(format!("field task failed: {e}"))));
            if let Err(e) = outcome {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
