//! Output formatting: table, JSON, YAML, plain.
//!
//! Records are schemaless JSON objects, so tables are built column by
//! column from the keys the records actually carry.

use std::io::{self, Write};

use serde_json::Value;
use tabled::{builder::Builder, settings::Style};

use crate::cli::OutputFormat;

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of records in the chosen format.
///
/// - `table`: one row per record, `id` first, then keys in first-seen order
/// - `json` / `json-compact` / `yaml`: the records as an array
/// - `plain`: one identifier per line
pub fn render_records(format: OutputFormat, records: &[Value]) -> String {
    match format {
        OutputFormat::Table => render_table(records),
        OutputFormat::Json => render_json_pretty(records),
        OutputFormat::JsonCompact => render_json_compact(records),
        OutputFormat::Yaml => render_yaml(records),
        OutputFormat::Plain => records.iter().map(record_id).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single record. Tables show it as `field  value` rows.
pub fn render_record(format: OutputFormat, record: &Value) -> String {
    match format {
        OutputFormat::Table => render_detail(record),
        OutputFormat::Json => render_json_pretty(record),
        OutputFormat::JsonCompact => render_json_compact(record),
        OutputFormat::Yaml => render_yaml(record),
        OutputFormat::Plain => record_id(record),
    }
}

/// Render any serializable value; `table` and `plain` use `detail_fn`.
pub fn render_single<T>(format: OutputFormat, data: &T, detail_fn: impl Fn(&T) -> String) -> String
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table | OutputFormat::Plain => detail_fn(data),
        OutputFormat::Json => render_json_pretty(data),
        OutputFormat::JsonCompact => render_json_compact(data),
        OutputFormat::Yaml => render_yaml(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
    let _ = stdout.flush();
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table(records: &[Value]) -> String {
    let columns = columns(records);
    let mut builder = Builder::default();
    builder.push_record(columns.iter().cloned());
    for record in records {
        builder.push_record(
            columns
                .iter()
                .map(|c| record.get(c).map(cell).unwrap_or_default()),
        );
    }
    builder.build().with(Style::rounded()).to_string()
}

fn render_detail(record: &Value) -> String {
    let Some(fields) = record.as_object() else {
        return cell(record);
    };
    let mut builder = Builder::default();
    for (key, value) in fields {
        builder.push_record([key.clone(), cell(value)]);
    }
    builder.build().with(Style::rounded()).to_string()
}

/// Column order: `id` first, then keys in the order records reveal them.
fn columns(records: &[Value]) -> Vec<String> {
    let mut columns = vec!["id".to_owned()];
    for key in records.iter().filter_map(Value::as_object).flat_map(|o| o.keys()) {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.clone());
        }
    }
    columns
}

/// Strings unquoted, null empty, everything else compact JSON.
fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn record_id(record: &Value) -> String {
    record.get("id").map(cell).unwrap_or_default()
}

/// Pretty-printed JSON.
pub(crate) fn render_json_pretty<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

/// Compact single-line JSON.
pub(crate) fn render_json_compact<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string(data).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

/// YAML output.
pub(crate) fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_puts_id_first_and_unions_columns() {
        let records = [
            json!({ "id": 1, "title": "write" }),
            json!({ "id": 2, "done": true }),
        ];
        assert_eq!(columns(&records), ["id", "title", "done"]);

        let table = render_records(OutputFormat::Table, &records);
        assert!(table.contains("write"));
        assert!(table.contains("true"));
    }

    #[test]
    fn plain_prints_identifiers() {
        let records = [json!({ "id": 1 }), json!({ "id": "abc" }), json!({})];
        assert_eq!(render_records(OutputFormat::Plain, &records), "1\nabc\n");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_record(OutputFormat::JsonCompact, &json!({ "id": 3, "tags": ["a"] }));
        assert_eq!(out, r#"{"id":3,"tags":["a"]}"#);
    }

    #[test]
    fn cells_unquote_strings_and_blank_nulls() {
        assert_eq!(cell(&json!("x")), "x");
        assert_eq!(cell(&Value::Null), "");
        assert_eq!(cell(&json!({ "a": 1 })), r#"{"a":1}"#);
    }
}
