use super::blocks::*;
use crate::types::BlockId;
use serde::{Deserialize, Serialize};

/// A node in a document's content tree, as fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// `None` for the document root.
    pub parent_id: Option<BlockId>,
    /// Child ids in the order the parent declares them.
    pub children: Vec<BlockId>,
    pub content: BlockContent,
}

impl Block {
    pub fn new(id: impl Into<String>, content: BlockContent) -> Self {
        Self {
            id: BlockId::from_raw(id),
            parent_id: None,
            children: Vec::new(),
            content,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_id = Some(BlockId::from_raw(parent));
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(BlockId::from_raw).collect();
        self
    }

    pub fn tag(&self) -> BlockTag {
        self.content.tag()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Type-specific content of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockContent {
    /// Document root; carries the title.
    Page(TextPayload),
    Text(TextPayload),
    Heading { level: u8, text: TextPayload },
    Bullet(TextPayload),
    Ordered {
        text: TextPayload,
        sequence: OrderedSequence,
    },
    Todo { text: TextPayload, done: bool },
    Code {
        text: TextPayload,
        language: Option<u32>,
    },
    Quote(TextPayload),
    QuoteContainer,
    Callout { emoji: Option<String> },
    Divider,
    Image(MediaReference),
    File(MediaReference),
    Board(MediaReference),
    Sheet(EmbeddedSheet),
    Bitable(EmbeddedBitable),
    Table(TableGeometry),
    TableCell,
    Grid,
    GridColumn,
    View,
    /// A block type this crate doesn't model.
    Unknown { type_code: u32 },
}

/// The closed set of block type tags, used as the renderer dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    Page,
    Text,
    Heading,
    Bullet,
    Ordered,
    Todo,
    Code,
    Quote,
    QuoteContainer,
    Callout,
    Divider,
    Image,
    File,
    Board,
    Sheet,
    Bitable,
    Table,
    TableCell,
    Grid,
    GridColumn,
    View,
    Unknown,
}

impl BlockTag {
    /// List items join with their siblings without a blank line.
    pub fn is_list_item(&self) -> bool {
        matches!(self, BlockTag::Bullet | BlockTag::Ordered | BlockTag::Todo)
    }

    /// Containers whose children are rendered as quoted lines.
    pub fn quotes_children(&self) -> bool {
        matches!(
            self,
            BlockTag::Quote | BlockTag::QuoteContainer | BlockTag::Callout
        )
    }
}

impl BlockContent {
    pub fn tag(&self) -> BlockTag {
        match self {
            BlockContent::Page(_) => BlockTag::Page,
            BlockContent::Text(_) => BlockTag::Text,
            BlockContent::Heading { .. } => BlockTag::Heading,
            BlockContent::Bullet(_) => BlockTag::Bullet,
            BlockContent::Ordered { .. } => BlockTag::Ordered,
            BlockContent::Todo { .. } => BlockTag::Todo,
            BlockContent::Code { .. } => BlockTag::Code,
            BlockContent::Quote(_) => BlockTag::Quote,
            BlockContent::QuoteContainer => BlockTag::QuoteContainer,
            BlockContent::Callout { .. } => BlockTag::Callout,
            BlockContent::Divider => BlockTag::Divider,
            BlockContent::Image(_) => BlockTag::Image,
            BlockContent::File(_) => BlockTag::File,
            BlockContent::Board(_) => BlockTag::Board,
            BlockContent::Sheet(_) => BlockTag::Sheet,
            BlockContent::Bitable(_) => BlockTag::Bitable,
            BlockContent::Table(_) => BlockTag::Table,
            BlockContent::TableCell => BlockTag::TableCell,
            BlockContent::Grid => BlockTag::Grid,
            BlockContent::GridColumn => BlockTag::GridColumn,
            BlockContent::View => BlockTag::View,
            BlockContent::Unknown { .. } => BlockTag::Unknown,
        }
    }

    /// Text carried by text-bearing blocks.
    pub fn text(&self) -> Option<&TextPayload> {
        match self {
            BlockContent::Page(text)
            | BlockContent::Text(text)
            | BlockContent::Bullet(text)
            | BlockContent::Quote(text)
            | BlockContent::Heading { text, .. }
            | BlockContent::Ordered { text, .. }
            | BlockContent::Todo { text, .. }
            | BlockContent::Code { text, .. } => Some(text),
            _ => None,
        }
    }

    /// The asset this block references, if any.
    pub fn media(&self) -> Option<&MediaReference> {
        match self {
            BlockContent::Image(media) | BlockContent::File(media) | BlockContent::Board(media) => {
                Some(media)
            }
            _ => None,
        }
    }
}
