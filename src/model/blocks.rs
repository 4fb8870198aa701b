//! Type-specific block payloads.

use crate::types::BlockId;
use serde::{Deserialize, Serialize};

// --- Text ---

/// The inline content of a text-bearing block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub elements: Vec<TextElement>,
}

impl TextPayload {
    pub fn new(elements: Vec<TextElement>) -> Self {
        Self { elements }
    }

    /// A single unstyled run.
    pub fn plain(content: impl Into<String>) -> Self {
        Self::new(vec![TextElement::Run {
            content: content.into(),
            style: TextStyle::default(),
        }])
    }

    /// Concatenated text with all styling dropped.
    pub fn plain_text(&self) -> String {
        self.elements
            .iter()
            .map(|element| match element {
                TextElement::Run { content, .. } => content.as_str(),
                TextElement::Equation { content } => content.as_str(),
                TextElement::MentionDoc { title, token, .. } => {
                    title.as_deref().unwrap_or(token.as_str())
                }
                TextElement::LinkPreview { url, .. } => url.as_str(),
                TextElement::MentionUser { .. } | TextElement::Unsupported => "",
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plain_text().trim().is_empty()
            && !self
                .elements
                .iter()
                .any(|e| matches!(e, TextElement::MentionUser { .. }))
    }
}

/// One inline element of a text payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextElement {
    Run { content: String, style: TextStyle },
    MentionUser { user_id: String },
    MentionDoc {
        token: String,
        title: Option<String>,
        url: Option<String>,
    },
    Equation { content: String },
    LinkPreview { url: String, title: Option<String> },
    Unsupported,
}

/// Inline styling of a text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub inline_code: bool,
    /// Link target as sent by the platform (percent-encoded).
    pub link: Option<String>,
}

/// Numbering of an ordered list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderedSequence {
    /// Continue from the previous sibling.
    Auto,
    /// Start (or restart) at this number.
    Explicit(u32),
}

// --- Media ---

/// What an embedded asset is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    File,
    Board,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::File => "file",
            MediaKind::Board => "whiteboard",
        }
    }
}

/// A token embedded in a block denoting an external asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaReference {
    pub token: String,
    pub kind: MediaKind,
    /// Original file name; its extension is the type hint for downloads.
    pub name: Option<String>,
    pub size: Option<u64>,
}

impl MediaReference {
    pub fn new(kind: MediaKind, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            kind,
            name: None,
            size: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// File extension to use when materializing the asset.
    pub fn extension_hint(&self) -> Option<String> {
        self.name
            .as_deref()
            .and_then(|n| std::path::Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.len() <= 8)
            .map(|e| e.to_ascii_lowercase())
            .or_else(|| match self.kind {
                MediaKind::Board => Some("png".to_string()),
                _ => None,
            })
    }

    /// Display label for attachments.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("untitled file")
    }
}

// --- Tables ---

/// Merge extent of the cell at one flat grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMerge {
    pub row_span: usize,
    pub col_span: usize,
}

impl Default for CellMerge {
    fn default() -> Self {
        Self {
            row_span: 1,
            col_span: 1,
        }
    }
}

/// Geometry of a table block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableGeometry {
    pub rows: usize,
    pub columns: usize,
    /// Cell block ids, row-major.
    pub cells: Vec<BlockId>,
    /// Merge info by flat position (`row * columns + column`).
    pub merges: Vec<CellMerge>,
    /// First row is a header; otherwise Markdown output gets an empty one.
    pub header_row: bool,
}

impl TableGeometry {
    pub fn has_merges(&self) -> bool {
        self.merges
            .iter()
            .any(|m| m.row_span > 1 || m.col_span > 1)
    }
}

// --- Embedded resources ---

/// A spreadsheet worksheet embedded in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedSheet {
    pub token: String,
    pub sheet_id: String,
}

impl EmbeddedSheet {
    /// Splits the platform's `<spreadsheet>_<sheet>` composite token.
    pub fn from_composite(composite: &str) -> Option<Self> {
        let (token, sheet_id) = composite.split_once('_')?;
        (!token.is_empty() && !sheet_id.is_empty()).then(|| Self {
            token: token.to_string(),
            sheet_id: sheet_id.to_string(),
        })
    }
}

/// A bitable table embedded in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedBitable {
    pub app_token: String,
    pub table_id: String,
    pub view_id: Option<String>,
}

impl EmbeddedBitable {
    /// Splits the platform's `<app>_<table>` composite token.
    pub fn from_composite(composite: &str, view_id: Option<String>) -> Option<Self> {
        let (app_token, table_id) = composite.split_once('_')?;
        (!app_token.is_empty() && !table_id.is_empty()).then(|| Self {
            app_token: app_token.to_string(),
            table_id: table_id.to_string(),
            view_id,
        })
    }
}
