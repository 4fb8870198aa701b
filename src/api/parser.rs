// src/api/parser.rs
//! Parsing of Feishu API responses into domain types.
//!
//! Envelope handling is uniform: a non-zero `code` becomes a typed
//! `FeishuService` error, whatever the HTTP status said. Block JSON is
//! parsed by hand because each block type stores its payload under a
//! different key.

use super::client::ApiResponse;
use super::responses::{Envelope, PageData, RawWikiNode};
use super::types::PaginatedResponse;
use crate::error::{AppError, FeishuErrorCode};
use crate::model::{
    Block, BlockContent, CellMerge, EmbeddedBitable, EmbeddedSheet, MediaKind, MediaReference,
    OrderedSequence, TableGeometry, TextElement, TextPayload, TextStyle, WikiNode, WikiObjType,
};
use crate::types::{BlockId, Warning, WarningKind, WikiNodeToken};
use serde::de::DeserializeOwned;
use serde_json::Value;

const ERROR_BODY_PREVIEW_LENGTH: usize = 200;

/// Unwraps the `data` member of an envelope, classifying failures.
pub fn parse_envelope(result: ApiResponse<String>, endpoint: &str) -> Result<Value, AppError> {
    let envelope: Envelope = match serde_json::from_str(&result.data) {
        Ok(envelope) => envelope,
        Err(e) => {
            if result.status.is_success() {
                log::error!("Failed to parse response from {}: {}", result.url, e);
                return Err(AppError::MalformedResponse(format!(
                    "{}: {} (body: {})",
                    endpoint,
                    e,
                    preview(&result.data)
                )));
            }
            return Err(AppError::FeishuService {
                code: FeishuErrorCode::from_http_status(result.status.as_u16()),
                message: format!("HTTP {} from {}", result.status, result.url),
                endpoint: endpoint.to_string(),
            });
        }
    };

    if envelope.code != 0 {
        return Err(AppError::FeishuService {
            code: FeishuErrorCode::from_api_code(envelope.code),
            message: envelope.msg,
            endpoint: endpoint.to_string(),
        });
    }

    if !result.status.is_success() {
        return Err(AppError::FeishuService {
            code: FeishuErrorCode::from_http_status(result.status.as_u16()),
            message: format!("HTTP {} from {}", result.status, result.url),
            endpoint: endpoint.to_string(),
        });
    }

    Ok(envelope.data)
}

/// Deserializes an envelope's `data` member.
pub fn parse_data<T: DeserializeOwned>(data: Value, endpoint: &str) -> Result<T, AppError> {
    serde_json::from_value(data)
        .map_err(|e| AppError::MalformedResponse(format!("{}: {}", endpoint, e)))
}

fn preview(body: &str) -> String {
    if body.len() > ERROR_BODY_PREVIEW_LENGTH {
        let cut = (0..=ERROR_BODY_PREVIEW_LENGTH)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}

// --- Blocks ---

/// Parses one page of the block listing.
///
/// A block that cannot be placed is dropped with a `Structural` warning;
/// the rest of the page survives.
pub fn parse_blocks_page(data: Value) -> Result<PaginatedResponse<Block>, AppError> {
    let page: PageData<Value> = parse_data(data, "docx blocks")?;
    let mut items = Vec::with_capacity(page.items.len());
    let mut warnings = Vec::new();
    for value in &page.items {
        match parse_block_value(value) {
            Ok(block) => items.push(block),
            Err(e) => {
                log::warn!("Dropping unparseable block: {}", e);
                warnings.push(Warning::new(
                    WarningKind::Structural,
                    format!("a block was dropped: {}", e),
                ));
            }
        }
    }

    Ok(PaginatedResponse {
        items,
        page_token: page.page_token.filter(|t| !t.is_empty()),
        has_more: page.has_more,
        warnings,
    })
}

/// Parses a single block object as returned by the docx API.
///
/// Unknown or missing block types parse successfully as
/// `BlockContent::Unknown`; only a missing `block_id` is an error.
pub fn parse_block_value(value: &Value) -> Result<Block, AppError> {
    let id = value
        .get("block_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::MalformedResponse("block without block_id".to_string()))?;

    let type_code = match value.get("block_type").and_then(Value::as_u64) {
        Some(code) => code as u32,
        None => {
            log::warn!("Block '{}' has no block_type; treating it as unknown", id);
            0
        }
    };

    let parent_id = value
        .get("parent_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(BlockId::from_raw);

    let children = value
        .get("children")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(BlockId::from_raw)
                .collect()
        })
        .unwrap_or_default();

    Ok(Block {
        id: BlockId::from_raw(id),
        parent_id,
        children,
        content: parse_content(type_code, value),
    })
}

fn parse_content(type_code: u32, value: &Value) -> BlockContent {
    let text_of = |key: &str| parse_text_payload(value.get(key));

    match type_code {
        1 => BlockContent::Page(text_of("page")),
        2 => BlockContent::Text(text_of("text")),
        3..=11 => {
            let level = (type_code - 2) as u8;
            BlockContent::Heading {
                level,
                text: text_of(&format!("heading{}", level)),
            }
        }
        12 => BlockContent::Bullet(text_of("bullet")),
        13 => BlockContent::Ordered {
            text: text_of("ordered"),
            sequence: parse_sequence(value.pointer("/ordered/style/sequence")),
        },
        14 => BlockContent::Code {
            text: text_of("code"),
            language: value
                .pointer("/code/style/language")
                .and_then(Value::as_u64)
                .map(|l| l as u32),
        },
        15 => BlockContent::Quote(text_of("quote")),
        17 => BlockContent::Todo {
            text: text_of("todo"),
            done: value
                .pointer("/todo/style/done")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        18 => embedded_bitable(value, "bitable").unwrap_or(BlockContent::Unknown { type_code }),
        19 => BlockContent::Callout {
            emoji: str_at(value, "/callout/emoji_id"),
        },
        22 => BlockContent::Divider,
        23 => media(value, "file", MediaKind::File).unwrap_or(BlockContent::Unknown { type_code }),
        24 => BlockContent::Grid,
        25 => BlockContent::GridColumn,
        27 => media(value, "image", MediaKind::Image).unwrap_or(BlockContent::Unknown { type_code }),
        30 => str_at(value, "/sheet/token")
            .and_then(|t| EmbeddedSheet::from_composite(&t))
            .map(BlockContent::Sheet)
            .unwrap_or(BlockContent::Unknown { type_code }),
        31 => BlockContent::Table(parse_table(value)),
        32 => BlockContent::TableCell,
        33 => BlockContent::View,
        34 => BlockContent::QuoteContainer,
        43 => media(value, "board", MediaKind::Board).unwrap_or(BlockContent::Unknown { type_code }),
        _ if value.get("reference_base").is_some() => {
            embedded_bitable(value, "reference_base").unwrap_or(BlockContent::Unknown { type_code })
        }
        _ => BlockContent::Unknown { type_code },
    }
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_sequence(value: Option<&Value>) -> OrderedSequence {
    match value {
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(OrderedSequence::Explicit)
            .unwrap_or(OrderedSequence::Auto),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| OrderedSequence::Explicit(n as u32))
            .unwrap_or(OrderedSequence::Auto),
        _ => OrderedSequence::Auto,
    }
}

fn media(value: &Value, key: &str, kind: MediaKind) -> Option<BlockContent> {
    let token = str_at(value, &format!("/{}/token", key))?;
    let mut reference = MediaReference::new(kind, token);
    reference.name = str_at(value, &format!("/{}/name", key));
    reference.size = value
        .pointer(&format!("/{}/size", key))
        .and_then(Value::as_u64);

    Some(match kind {
        MediaKind::Image => BlockContent::Image(reference),
        MediaKind::File => BlockContent::File(reference),
        MediaKind::Board => BlockContent::Board(reference),
    })
}

fn embedded_bitable(value: &Value, key: &str) -> Option<BlockContent> {
    let token = str_at(value, &format!("/{}/token", key))?;
    let view_id = str_at(value, &format!("/{}/view_id", key));
    EmbeddedBitable::from_composite(&token, view_id).map(BlockContent::Bitable)
}

fn parse_table(value: &Value) -> TableGeometry {
    let property = value.pointer("/table/property");
    let usize_at = |key: &str| {
        property
            .and_then(|p| p.get(key))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    };

    let cells = value
        .pointer("/table/cells")
        .and_then(Value::as_array)
        .map(|cells| {
            cells
                .iter()
                .filter_map(Value::as_str)
                .map(BlockId::from_raw)
                .collect()
        })
        .unwrap_or_default();

    let merges = property
        .and_then(|p| p.get("merge_info"))
        .and_then(Value::as_array)
        .map(|infos| {
            infos
                .iter()
                .map(|info| CellMerge {
                    row_span: info.get("row_span").and_then(Value::as_u64).unwrap_or(1).max(1)
                        as usize,
                    col_span: info.get("col_span").and_then(Value::as_u64).unwrap_or(1).max(1)
                        as usize,
                })
                .collect()
        })
        .unwrap_or_default();

    TableGeometry {
        rows: usize_at("row_size"),
        columns: usize_at("column_size"),
        cells,
        merges,
        header_row: property
            .and_then(|p| p.get("header_row"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

/// Parses the `elements` array of a text-bearing payload.
pub fn parse_text_payload(payload: Option<&Value>) -> TextPayload {
    let Some(elements) = payload
        .and_then(|p| p.get("elements"))
        .and_then(Value::as_array)
    else {
        return TextPayload::default();
    };

    TextPayload::new(elements.iter().map(parse_text_element).collect())
}

fn parse_text_element(element: &Value) -> TextElement {
    if let Some(run) = element.get("text_run") {
        let style = run.get("text_element_style");
        let flag = |key: &str| {
            style
                .and_then(|s| s.get(key))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        return TextElement::Run {
            content: run
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            style: TextStyle {
                bold: flag("bold"),
                italic: flag("italic"),
                strikethrough: flag("strikethrough"),
                underline: flag("underline"),
                inline_code: flag("inline_code"),
                link: style
                    .and_then(|s| s.pointer("/link/url"))
                    .and_then(Value::as_str)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
            },
        };
    }

    if let Some(user_id) = element.pointer("/mention_user/user_id").and_then(Value::as_str) {
        return TextElement::MentionUser {
            user_id: user_id.to_string(),
        };
    }

    if let Some(doc) = element.get("mention_doc") {
        return TextElement::MentionDoc {
            token: str_at(doc, "/token").unwrap_or_default(),
            title: str_at(doc, "/title"),
            url: str_at(doc, "/url"),
        };
    }

    if let Some(content) = element.pointer("/equation/content").and_then(Value::as_str) {
        return TextElement::Equation {
            content: content.trim_end_matches('\n').to_string(),
        };
    }

    if let Some(url) = element.pointer("/link_preview/url").and_then(Value::as_str) {
        return TextElement::LinkPreview {
            url: url.to_string(),
            title: str_at(element, "/link_preview/title"),
        };
    }

    TextElement::Unsupported
}

// --- Wiki ---

pub fn wiki_node_from_raw(raw: RawWikiNode) -> WikiNode {
    WikiNode {
        space_id: raw.space_id,
        node_token: WikiNodeToken::from_raw(raw.node_token),
        obj_token: raw.obj_token,
        obj_type: WikiObjType::parse(&raw.obj_type),
        parent_node_token: raw.parent_node_token.filter(|t| !t.is_empty()),
        title: raw.title,
        has_child: raw.has_child,
    }
}
