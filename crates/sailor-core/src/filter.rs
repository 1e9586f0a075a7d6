// ── Field/value filters ──
//
// A filter maps field names to sets of acceptable values. It doubles as
// the remote `where` query and as the local predicate for `search`.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::entity::Entity;

/// Normalized field → acceptable-values mapping.
///
/// Keys are kept sorted and a single value is stored the same way as a
/// one-element set, so equal filters always produce equal
/// [`signature`](Self::signature)s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    fields: BTreeMap<String, Vec<Value>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`. A JSON array means "any of".
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let values = match value.into() {
            Value::Array(items) => items,
            single => vec![single],
        };
        self.fields.insert(field.into(), values);
        self
    }

    /// Require `field` to equal any of `values`.
    pub fn any<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.fields
            .insert(field.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Require `field` to reference `entity`, matched by identifier.
    pub fn with_entity(self, field: impl Into<String>, entity: &Entity) -> Self {
        let id = entity.id().map_or(Value::Null, |id| id.to_json());
        self.with(field, id)
    }

    /// Build a filter from a JSON object. Anything else yields an empty filter.
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::new();
        };
        object
            .iter()
            .fold(Self::new(), |filter, (k, v)| filter.with(k.clone(), v.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Acceptable values for one field.
    pub fn values(&self, field: &str) -> Option<&[Value]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Combine with `other`; fields named by `other` replace ours.
    pub fn merge(&self, other: &Filter) -> Filter {
        let mut merged = self.clone();
        for (field, values) in &other.fields {
            merged.fields.insert(field.clone(), values.clone());
        }
        merged
    }

    /// The query form sent to the server: scalars for single values,
    /// arrays for value sets.
    pub fn to_query(&self) -> Value {
        let object: Map<String, Value> = self
            .fields
            .iter()
            .map(|(field, values)| {
                let value = match values.as_slice() {
                    [single] => single.clone(),
                    many => Value::Array(many.to_vec()),
                };
                (field.clone(), value)
            })
            .collect();
        Value::Object(object)
    }

    /// Stable textual identity, used as the registry cache-key suffix.
    pub fn signature(&self) -> String {
        self.to_query().to_string()
    }

    /// AND across fields, OR within each field's value set.
    ///
    /// `lookup` returns the record's current value for a field; missing
    /// fields compare as `null`.
    pub fn matches_with(&self, lookup: impl Fn(&str) -> Option<Value>) -> bool {
        self.fields.iter().all(|(field, accepted)| {
            let actual = lookup(field).unwrap_or(Value::Null);
            accepted.contains(&actual)
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

impl From<Value> for Filter {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> impl Fn(&str) -> Option<Value> {
        move |field| value.get(field).cloned()
    }

    #[test]
    fn scalar_and_single_element_list_are_equal() {
        let a = Filter::new().with("status", "open");
        let b = Filter::new().with("status", json!(["open"]));
        assert_eq!(a, b);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature(), r#"{"status":"open"}"#);
    }

    #[test]
    fn signature_is_key_order_independent() {
        let a = Filter::new().with("b", 1).with("a", 2);
        let b = Filter::from_json(&json!({"a": 2, "b": 1}));
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn empty_filter_signature() {
        assert_eq!(Filter::new().signature(), "{}");
        assert!(Filter::from_json(&json!("nope")).is_empty());
    }

    #[test]
    fn merge_overrides_and_extends() {
        let base = Filter::new().with("project", 1).with("status", "open");
        let merged = base.merge(&Filter::new().with("status", "closed").with("owner", 3));
        assert_eq!(
            merged.to_query(),
            json!({"owner": 3, "project": 1, "status": "closed"})
        );
        assert_eq!(base.merge(&Filter::new()), base);
    }

    #[test]
    fn matching_is_and_across_fields_or_within() {
        let filter = Filter::new()
            .any("status", ["open", "blocked"])
            .with("owner", 1);

        assert!(filter.matches_with(record(json!({"status": "open", "owner": 1}))));
        assert!(filter.matches_with(record(json!({"status": "blocked", "owner": 1}))));
        assert!(!filter.matches_with(record(json!({"status": "open", "owner": 2}))));
        assert!(!filter.matches_with(record(json!({"status": "done", "owner": 1}))));
    }

    #[test]
    fn missing_field_only_matches_null() {
        let filter = Filter::new().with("archived", Value::Null);
        assert!(filter.matches_with(record(json!({}))));
        assert!(!Filter::new().with("x", 1).matches_with(record(json!({}))));
    }

    #[test]
    fn query_uses_arrays_for_sets() {
        let filter = Filter::new().any("id", [1, 2]);
        assert_eq!(filter.to_query(), json!({"id": [1, 2]}));
    }
}
