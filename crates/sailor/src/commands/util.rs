//! Shared helpers for command handlers.

use std::collections::BTreeMap;
use std::io::{IsTerminal, Read};

use serde_json::Value;

use sailor_core::{EntityId, Filter};

use crate::error::CliError;

/// Fold repeated `-f field=value` pairs into a filter. A field given
/// more than once matches any of its values.
pub fn build_filter(conditions: &[(String, Value)]) -> Filter {
    let mut grouped: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for (field, value) in conditions {
        match value {
            Value::Array(items) => grouped
                .entry(field.as_str())
                .or_default()
                .extend(items.iter().cloned()),
            single => grouped.entry(field.as_str()).or_default().push(single.clone()),
        }
    }
    grouped
        .into_iter()
        .fold(Filter::new(), |filter, (field, values)| filter.any(field, values))
}

/// Record identifiers: numeric strings are integers.
pub fn record_id(raw: &str) -> EntityId {
    let Ok(id) = raw.parse::<EntityId>();
    id
}

/// Read a JSON object from a literal, `@path`, or `-` (stdin).
pub fn read_object(data: &str) -> Result<Value, CliError> {
    let text = if data == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else if let Some(path) = data.strip_prefix('@') {
        std::fs::read_to_string(path)?
    } else {
        data.to_owned()
    };

    let value: Value = serde_json::from_str(&text)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(CliError::Validation {
            field: "data".into(),
            reason: format!("expected a JSON object, got {value}"),
        })
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeated_fields_become_any_of() {
        let filter = build_filter(&[
            ("status".into(), json!("open")),
            ("owner".into(), json!(3)),
            ("status".into(), json!("blocked")),
        ]);
        assert_eq!(
            filter.signature(),
            r#"{"owner":3,"status":["open","blocked"]}"#
        );
    }

    #[test]
    fn array_values_spread_into_any_of() {
        let filter = build_filter(&[("id".into(), json!([1, 2]))]);
        assert_eq!(filter.values("id").unwrap(), [json!(1), json!(2)]);
    }

    #[test]
    fn numeric_ids_are_integers() {
        assert_eq!(record_id("42"), EntityId::Int(42));
        assert_eq!(record_id("5f1a"), EntityId::Str("5f1a".into()));
    }

    #[test]
    fn data_must_be_an_object() {
        assert!(read_object(r#"{"title":"x"}"#).is_ok());
        assert!(matches!(
            read_object("[1]").unwrap_err(),
            CliError::Validation { .. }
        ));
        assert!(matches!(read_object("{").unwrap_err(), CliError::Json(_)));
    }

    #[test]
    fn data_can_come_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        std::fs::write(&path, r#"{"title":"from file"}"#).unwrap();
        let value = read_object(&format!("@{}", path.display())).unwrap();
        assert_eq!(value["title"], "from file");
    }
}
