// ── Model schemas ──
//
// An item schema tags every declared field as plain, computed or a
// connection to another resource. Schemas are validated once, when a
// model is registered, instead of being sniffed at update time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::entity::{Entity, FieldValue};
use crate::error::CoreError;

/// Flags passed through to field computations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateParams {
    /// Do not refresh records resolved through connection fields.
    pub no_refresh: bool,
}

impl UpdateParams {
    pub fn no_refresh() -> Self {
        Self { no_refresh: true }
    }
}

/// Everything a computation can see while producing a field value.
#[derive(Debug, Clone)]
pub struct ComputeContext {
    /// The record being updated. Its other fields are already merged.
    pub entity: Entity,
    /// The field's value before the computation ran.
    pub previous: Option<FieldValue>,
    pub params: UpdateParams,
}

pub type ComputeFuture = BoxFuture<'static, Result<Option<FieldValue>, CoreError>>;

type ComputeFn = dyn Fn(ComputeContext) -> ComputeFuture + Send + Sync;

/// A field derived by an async function, re-run on every update.
#[derive(Clone)]
pub struct ComputedField {
    compute: Arc<ComputeFn>,
    props: Map<String, Value>,
}

impl ComputedField {
    pub fn new<F, Fut>(compute: F) -> Self
    where
        F: Fn(ComputeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<FieldValue>, CoreError>> + Send + 'static,
    {
        Self {
            compute: Arc::new(move |ctx| -> ComputeFuture { Box::pin(compute(ctx)) }),
            props: Map::new(),
        }
    }

    /// Attach extra descriptor properties.
    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props.extend(props);
        self
    }

    pub fn props(&self) -> &Map<String, Value> {
        &self.props
    }

    pub(crate) fn run(&self, ctx: ComputeContext) -> ComputeFuture {
        (self.compute)(ctx)
    }
}

impl fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedField")
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

/// How one schema field behaves.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    /// Reset to this value on every update.
    Plain(Value),
    Computed(ComputedField),
    /// Reference to records of another resource, resolved by identifier.
    Connection { resource: String },
}

impl FieldSpec {
    pub fn plain(default: impl Into<Value>) -> Self {
        Self::Plain(default.into())
    }

    pub fn computed<F, Fut>(compute: F) -> Self
    where
        F: Fn(ComputeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<FieldValue>, CoreError>> + Send + 'static,
    {
        Self::Computed(ComputedField::new(compute))
    }

    pub fn connection(resource: impl Into<String>) -> Self {
        Self::Connection {
            resource: resource.into(),
        }
    }

    /// Computed and connection fields are derived on every update.
    pub fn is_derived(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

impl From<ComputedField> for FieldSpec {
    fn from(field: ComputedField) -> Self {
        Self::Computed(field)
    }
}

// ── Item schema ──────────────────────────────────────────────────────

/// Declared fields of a model's records, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ItemSchema {
    fields: IndexMap<String, FieldSpec>,
}

impl ItemSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.fields.insert(name.into(), spec.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_connection(&self, name: &str) -> bool {
        self.get(name).is_some_and(FieldSpec::is_connection)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn validate(&self, model: &str) -> Result<(), CoreError> {
        for (field, spec) in &self.fields {
            let invalid = |reason: &str| CoreError::InvalidSchema {
                model: model.to_owned(),
                field: field.clone(),
                reason: reason.to_owned(),
            };

            if field.trim().is_empty() {
                return Err(invalid("field name is empty"));
            }
            if field == "id" && spec.is_derived() {
                return Err(invalid("the identifier cannot be derived"));
            }
            if let FieldSpec::Connection { resource } = spec {
                if resource.trim().is_empty() {
                    return Err(invalid("connection has no target resource"));
                }
                if resource.starts_with('/') || resource.ends_with('/') {
                    return Err(invalid("connection target must be a bare resource name"));
                }
            }
        }
        Ok(())
    }
}

// ── Collection schema ────────────────────────────────────────────────

/// Free-form named properties exposed on a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionSchema {
    properties: IndexMap<String, Value>,
}

impl CollectionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn validate(&self, model: &str) -> Result<(), CoreError> {
        match self.properties.keys().find(|k| k.trim().is_empty()) {
            Some(field) => Err(CoreError::InvalidSchema {
                model: model.to_owned(),
                field: field.clone(),
                reason: "property name is empty".into(),
            }),
            None => Ok(()),
        }
    }
}
