//! Classification of user input into the kind of resource to export.

use super::ids::{BitableToken, BoardToken, DocumentId, SpreadsheetToken, WikiNodeToken};
use super::ValidationError;
use std::fmt;
use url::Url;

/// A remote resource the export driver knows how to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    Document {
        document_id: DocumentId,
    },
    Sheet {
        token: SpreadsheetToken,
        sheet_id: Option<String>,
    },
    Bitable {
        app_token: BitableToken,
        table_id: Option<String>,
        view_id: Option<String>,
    },
    WikiNode {
        node_token: WikiNodeToken,
    },
    Board {
        token: BoardToken,
    },
}

impl ResourceRef {
    /// Classifies a platform URL, a `kind:token` composite, or a bare
    /// document id.
    ///
    /// Composite forms: `docx:<id>`, `sheet:<token>[/<sheet_id>]`,
    /// `bitable:<app>[/<table_id>]`, `wiki:<node>`, `board:<token>`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::EmptyField("resource"));
        }

        if input.starts_with("http://") || input.starts_with("https://") {
            return Self::from_url(input);
        }

        if let Some((kind, rest)) = input.split_once(':') {
            return Self::from_composite(kind, rest);
        }

        Ok(ResourceRef::Document {
            document_id: DocumentId::parse(input)?,
        })
    }

    fn from_url(input: &str) -> Result<Self, ValidationError> {
        let url = Url::parse(input).map_err(|e| ValidationError::InvalidUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let query = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty())
        };

        // Find the first "<kind>/<token>" pair; paths may carry a locale or
        // workspace prefix before it.
        let position = segments.windows(2).position(|pair| {
            matches!(
                pair[0],
                "docx" | "docs" | "sheets" | "base" | "wiki" | "board" | "whiteboard"
            )
        });

        let Some(i) = position else {
            return Err(ValidationError::InvalidUrl {
                url: input.to_string(),
                reason: "not a recognized document, sheet, base, wiki or board link".to_string(),
            });
        };

        let token = segments[i + 1];
        match segments[i] {
            "docx" | "docs" => Ok(ResourceRef::Document {
                document_id: DocumentId::parse(token)?,
            }),
            "sheets" => Ok(ResourceRef::Sheet {
                token: SpreadsheetToken::parse(token)?,
                sheet_id: query("sheet"),
            }),
            "base" => Ok(ResourceRef::Bitable {
                app_token: BitableToken::parse(token)?,
                table_id: query("table"),
                view_id: query("view"),
            }),
            "wiki" => Ok(ResourceRef::WikiNode {
                node_token: WikiNodeToken::parse(token)?,
            }),
            _ => Ok(ResourceRef::Board {
                token: BoardToken::parse(token)?,
            }),
        }
    }

    fn from_composite(kind: &str, rest: &str) -> Result<Self, ValidationError> {
        let (token, sub) = match rest.split_once('/') {
            Some((token, sub)) if !sub.is_empty() => (token, Some(sub.to_string())),
            _ => (rest.trim_end_matches('/'), None),
        };

        match kind.to_ascii_lowercase().as_str() {
            "doc" | "docx" | "document" => Ok(ResourceRef::Document {
                document_id: DocumentId::parse(token)?,
            }),
            "sheet" | "sheets" => Ok(ResourceRef::Sheet {
                token: SpreadsheetToken::parse(token)?,
                sheet_id: sub,
            }),
            "bitable" | "base" => Ok(ResourceRef::Bitable {
                app_token: BitableToken::parse(token)?,
                table_id: sub,
                view_id: None,
            }),
            "wiki" => Ok(ResourceRef::WikiNode {
                node_token: WikiNodeToken::parse(token)?,
            }),
            "board" | "whiteboard" => Ok(ResourceRef::Board {
                token: BoardToken::parse(token)?,
            }),
            other => Err(ValidationError::UnknownResourceKind(other.to_string())),
        }
    }

    /// Short human-readable kind name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResourceRef::Document { .. } => "document",
            ResourceRef::Sheet { .. } => "sheet",
            ResourceRef::Bitable { .. } => "bitable",
            ResourceRef::WikiNode { .. } => "wiki node",
            ResourceRef::Board { .. } => "board",
        }
    }

    /// The primary token of the resource.
    pub fn token(&self) -> &str {
        match self {
            ResourceRef::Document { document_id } => document_id.as_str(),
            ResourceRef::Sheet { token, .. } => token.as_str(),
            ResourceRef::Bitable { app_token, .. } => app_token.as_str(),
            ResourceRef::WikiNode { node_token } => node_token.as_str(),
            ResourceRef::Board { token } => token.as_str(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind_name(), self.token())
    }
}
