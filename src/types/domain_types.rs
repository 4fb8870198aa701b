// src/types/domain_types.rs
//! Domain-specific newtypes for type safety and validation.

use super::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bearer token for Feishu Open Platform requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Create a new access token with validation
    pub fn new(token: impl Into<String>) -> Result<Self, ValidationError> {
        let token = token.into();
        let trimmed = token.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::InvalidAccessToken {
                reason: "access token cannot be empty".to_string(),
            });
        }

        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::InvalidAccessToken {
                reason: "access token cannot contain whitespace".to_string(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the token as a string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Redact token in display
        let visible: String = self.0.chars().take(6).collect();
        write!(f, "{}...", visible)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", self)
    }
}

/// The final output of the render stage — Markdown ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedMarkdown(String);

impl RenderedMarkdown {
    pub fn new(content: String) -> Self {
        Self(content)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RenderedMarkdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recovered failure recorded alongside an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub context: Option<String>,
}

/// What kind of partial failure a warning records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Pagination stopped at a permission denial; later blocks are missing.
    PermissionGap,
    /// A child block declared by its parent was not fetched.
    InaccessibleBlock,
    /// An image, file or board could not be resolved.
    MediaUnavailable,
    /// A downloaded asset fell back to its remote URL.
    MediaDownloadFailed,
    /// A block type this renderer doesn't know.
    UnsupportedBlock,
    /// Malformed tree structure confined to one branch.
    Structural,
    /// An embedded sheet or bitable could not be inlined.
    EmbeddedUnavailable,
    /// A user mention could not be resolved to a name.
    MentionUnresolved,
    /// A wiki node's export failed and was skipped.
    BranchFailed,
    /// A listing hit its page limit; later items are missing.
    Truncated,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, " ({})", ctx)?;
        }
        Ok(())
    }
}
