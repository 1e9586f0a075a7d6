// ── Field values ──

use serde_json::{Map, Value};

use super::Entity;
use crate::id::EntityId;

/// A record field: plain JSON, a linked record, or a list of either.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Json(Value),
    Entity(Entity),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn null() -> Self {
        Self::Json(Value::Null)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Json(Value::Null))
    }

    /// Linked records in this value, in order.
    pub fn entities(&self) -> Vec<Entity> {
        match self {
            Self::Entity(e) => vec![e.clone()],
            Self::List(items) => items.iter().filter_map(|v| v.as_entity().cloned()).collect(),
            Self::Json(_) => Vec::new(),
        }
    }

    /// The value used for filter comparisons: linked records compare by
    /// identifier.
    pub(crate) fn match_key(&self) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Entity(e) => e.id().map_or(Value::Null, |id| id.to_json()),
            Self::List(items) => Value::Array(items.iter().map(Self::match_key).collect()),
        }
    }

    /// Record identifiers referenced by this value: bare ids, objects with
    /// an `id`, linked records, or lists of those.
    pub(crate) fn referenced_ids(&self) -> Vec<EntityId> {
        match self {
            Self::Entity(e) => e.id().into_iter().collect(),
            Self::List(items) => items.iter().flat_map(Self::referenced_ids).collect(),
            Self::Json(Value::Array(items)) => items.iter().filter_map(json_ref_id).collect(),
            Self::Json(v) => json_ref_id(v).into_iter().collect(),
        }
    }

    /// Whether this value holds a collection of references.
    pub(crate) fn is_plural(&self) -> bool {
        matches!(self, Self::List(_) | Self::Json(Value::Array(_)))
    }

    /// Plain JSON rendering; linked records become their full field set.
    pub fn to_json(&self) -> Value {
        self.render(&mut Vec::new())
    }

    pub(crate) fn render(&self, chain: &mut Vec<*const ()>) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Entity(e) => e.render(chain),
            Self::List(items) => Value::Array(items.iter().map(|v| v.render(chain)).collect()),
        }
    }
}

fn json_ref_id(value: &Value) -> Option<EntityId> {
    match value {
        Value::Object(o) => o.get("id").and_then(EntityId::from_json),
        other => EntityId::from_json(other),
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => a.ptr_eq(b),
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Entity> for FieldValue {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Vec<Entity>> for FieldValue {
    fn from(entities: Vec<Entity>) -> Self {
        Self::List(entities.into_iter().map(Self::Entity).collect())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Json(Value::from(s))
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Json(Value::from(i))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Json(Value::Bool(b))
    }
}

/// Merge a computation result onto a field's previous value.
///
/// Objects merge key by key (recursively, the result's keys win); any
/// other result replaces the previous value. A missing result clears a
/// field that had a value and leaves an absent field absent.
pub(crate) fn merge_result(
    previous: Option<FieldValue>,
    result: Option<FieldValue>,
) -> Option<FieldValue> {
    match (previous, result) {
        (Some(FieldValue::Json(mut base)), Some(FieldValue::Json(overlay)))
            if base.is_object() && overlay.is_object() =>
        {
            deep_merge(&mut base, overlay);
            Some(FieldValue::Json(base))
        }
        (_, Some(result)) => Some(result),
        (Some(_), None) => Some(FieldValue::null()),
        (None, None) => None,
    }
}

/// Recursively merge `overlay` into `base`. Non-object values replace.
pub(crate) fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => merge_maps(base, overlay),
        (base, overlay) => *base = overlay,
    }
}

fn merge_maps(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn objects_merge_onto_previous() {
        let merged = merge_result(
            Some(json!({"a": 1, "nested": {"x": 1, "y": 2}}).into()),
            Some(json!({"b": 2, "nested": {"y": 3}}).into()),
        );
        assert_eq!(
            merged,
            Some(json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 3}}).into())
        );
    }

    #[test]
    fn scalar_result_replaces() {
        assert_eq!(
            merge_result(Some(json!(4).into()), Some(json!("four").into())),
            Some(json!("four").into())
        );
    }

    #[test]
    fn missing_result_clears_or_stays_absent() {
        assert_eq!(merge_result(Some(json!(1).into()), None), Some(FieldValue::null()));
        assert_eq!(merge_result(None, None), None);
    }

    #[test]
    fn referenced_ids_accepts_every_shape() {
        assert_eq!(FieldValue::from(json!(3)).referenced_ids(), [EntityId::Int(3)]);
        assert_eq!(
            FieldValue::from(json!([1, {"id": "b"}, null])).referenced_ids(),
            [EntityId::Int(1), EntityId::Str("b".into())]
        );
        assert!(FieldValue::from(json!({"name": "x"})).referenced_ids().is_empty());
        assert!(FieldValue::from(json!([])).is_plural());
    }
}
