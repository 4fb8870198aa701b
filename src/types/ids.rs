use super::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Strong typing for platform tokens with phantom types.
///
/// Every Feishu resource is addressed by an opaque alphanumeric token; the
/// marker keeps a document token from being passed where a wiki node token
/// is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token<T> {
    value: String,
    _phantom: PhantomData<T>,
}

/// Marker types for different token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpreadsheetMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitableMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WikiNodeMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoardMarker;

/// Type aliases for specific token types
pub type DocumentId = Token<DocumentMarker>;
pub type BlockId = Token<BlockMarker>;
pub type SpreadsheetToken = Token<SpreadsheetMarker>;
pub type BitableToken = Token<BitableMarker>;
pub type WikiNodeToken = Token<WikiNodeMarker>;
pub type BoardToken = Token<BoardMarker>;

lazy_static::lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{4,128}$")
        .expect("Failed to compile token regex - this is a bug in the code");
}

impl<T> Token<T> {
    /// Validates user-supplied input as a token.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyField("token"));
        }
        if !TOKEN_REGEX.is_match(trimmed) {
            return Err(ValidationError::InvalidToken(trimmed.to_string()));
        }
        Ok(Self::from_raw(trimmed))
    }

    /// Wraps a token the platform itself returned (no validation).
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _phantom: PhantomData,
        }
    }

    /// Get the token as a string reference
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T> fmt::Display for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Serialize for Token<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Token<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_raw(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parsing() {
        let id = DocumentId::parse("  doxcnAbC123xyz ").unwrap();
        assert_eq!(id.as_str(), "doxcnAbC123xyz");

        assert!(DocumentId::parse("").is_err());
        assert!(DocumentId::parse("has space").is_err());
        assert!(DocumentId::parse("a/b").is_err());
    }

    #[test]
    fn test_tokens_of_different_kinds_share_representation() {
        let block = BlockId::from_raw("blk1");
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, "\"blk1\"");
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }
}
