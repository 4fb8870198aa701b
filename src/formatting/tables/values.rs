// src/formatting/tables/values.rs
//! Flattening of spreadsheet and bitable cell values into display text.

use super::CellGrid;
use crate::model::{BitableField, BitableRecord, TabularData};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Display text for a raw cell value.
///
/// `ui_type` is the bitable column type when known; `DateTime` columns
/// hold epoch milliseconds.
pub fn flatten_value(value: &Value, ui_type: Option<&str>) -> String {
    if value.is_null() {
        return String::new();
    }

    if ui_type == Some("DateTime") {
        if let Some(formatted) = value.as_i64().and_then(format_millis) {
            return formatted;
        }
    }

    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => join_items(items),
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                return text.to_string();
            }
            if let Some(name) = map.get("name").and_then(Value::as_str) {
                return name.to_string();
            }
            if let Some(Value::Array(items)) = map.get("value") {
                return join_items(items);
            }
            value.to_string()
        }
        other => other.to_string(),
    }
}

fn join_items(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => ["text", "name", "url", "full_name"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| item.to_string()),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_millis(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// A worksheet's values as a table; the first row is the header.
pub fn tabular_from_sheet(title: impl Into<String>, values: Vec<Vec<Value>>) -> TabularData {
    let mut rows = values
        .iter()
        .map(|row| row.iter().map(|v| flatten_value(v, None)).collect::<Vec<_>>());
    let header = rows.next().unwrap_or_default();

    TabularData {
        title: title.into(),
        header,
        rows: rows.collect(),
    }
}

/// A bitable table's records as a table, one column per field.
pub fn tabular_from_bitable(
    title: impl Into<String>,
    fields: &[BitableField],
    records: &[BitableRecord],
) -> TabularData {
    let rows = records
        .iter()
        .map(|record| {
            fields
                .iter()
                .map(|field| {
                    record
                        .fields
                        .get(&field.field_name)
                        .map(|v| flatten_value(v, Some(&field.ui_type)))
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    TabularData {
        title: title.into(),
        header: fields.iter().map(|f| f.field_name.clone()).collect(),
        rows,
    }
}

/// Lays out tabular data as a grid, header first.
pub fn tabular_grid(data: &TabularData) -> CellGrid {
    if data.is_empty() {
        return CellGrid::default();
    }
    let rows = std::iter::once(data.header.clone())
        .chain(data.rows.iter().cloned())
        .collect();
    CellGrid::from_rows(rows)
}
