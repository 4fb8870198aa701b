//! Spreadsheet and bitable data as fetched, before flattening into tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rectangular table of display strings, first row as header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularData {
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularData {
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.header.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }
}

/// Spreadsheet metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub sheets: Vec<SheetInfo>,
}

/// One worksheet of a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub sheet_id: String,
    pub title: String,
}

/// One table of a bitable app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitableTable {
    pub table_id: String,
    pub name: String,
}

/// A bitable column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitableField {
    pub field_id: String,
    pub field_name: String,
    /// Display type (`Text`, `DateTime`, `User`, ...).
    pub ui_type: String,
}

/// A bitable row: field name to raw JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitableRecord {
    pub record_id: String,
    pub fields: serde_json::Map<String, Value>,
}
