// src/api/responses.rs
//! Wire shapes of the `data` member of Feishu API envelopes.
//!
//! Every endpoint answers `{ "code": 0, "msg": "success", "data": { ... } }`.
//! Blocks are kept as raw JSON here because their payload key depends on
//! their type; `parser` turns them into model blocks.

use serde::Deserialize;
use serde_json::Value;

/// Top-level response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

/// Any cursor-paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PageData<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmpDownloadUrls {
    #[serde(default)]
    pub tmp_download_urls: Vec<TmpDownloadUrl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmpDownloadUrl {
    pub file_token: String,
    pub tmp_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiNodeData {
    pub node: RawWikiNode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWikiNode {
    #[serde(default)]
    pub space_id: String,
    pub node_token: String,
    #[serde(default)]
    pub obj_token: String,
    #[serde(default)]
    pub obj_type: String,
    #[serde(default)]
    pub parent_node_token: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub has_child: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpreadsheetData {
    pub spreadsheet: SpreadsheetMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpreadsheetMeta {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsQueryData {
    #[serde(default)]
    pub sheets: Vec<RawSheet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSheet {
    pub sheet_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub index: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetValuesData {
    #[serde(rename = "valueRange")]
    pub value_range: ValueRange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueRange {
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitableAppData {
    pub app: BitableAppMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitableAppMeta {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBitableTable {
    pub table_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBitableField {
    pub field_id: String,
    pub field_name: String,
    #[serde(default)]
    pub ui_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBitableRecord {
    #[serde(default)]
    pub record_id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserData {
    pub user: RawUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub en_name: Option<String>,
}
