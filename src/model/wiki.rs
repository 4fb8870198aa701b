use crate::types::WikiNodeToken;
use serde::{Deserialize, Serialize};

/// What a wiki node points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WikiObjType {
    Docx,
    /// Legacy document format; not exportable through the block API.
    Doc,
    Sheet,
    Bitable,
    Mindnote,
    File,
    Slides,
    Other(String),
}

impl WikiObjType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "docx" => Self::Docx,
            "doc" => Self::Doc,
            "sheet" => Self::Sheet,
            "bitable" => Self::Bitable,
            "mindnote" => Self::Mindnote,
            "file" => Self::File,
            "slides" => Self::Slides,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Sheet => "sheet",
            Self::Bitable => "bitable",
            Self::Mindnote => "mindnote",
            Self::File => "file",
            Self::Slides => "slides",
            Self::Other(raw) => raw,
        }
    }
}

/// A node of a knowledge-base tree. Fetched on demand, never cached across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiNode {
    pub space_id: String,
    pub node_token: WikiNodeToken,
    pub obj_token: String,
    pub obj_type: WikiObjType,
    pub parent_node_token: Option<String>,
    pub title: String,
    pub has_child: bool,
}

impl WikiNode {
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled"
        } else {
            self.title.trim()
        }
    }
}
