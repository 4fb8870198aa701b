// src/error.rs
//! Application error types with structured error handling.
//!
//! The variants follow the recovery policy of an export: some failures end
//! the whole export (`Auth`, `Cancelled`), some are retried (`TransientFetch`),
//! and the rest are confined to the block, asset or wiki branch they hit.

use std::fmt;
use thiserror::Error;

/// Feishu Open Platform error codes as a typed vocabulary.
///
/// The platform reports failures as a numeric `code` inside the JSON envelope,
/// often alongside a misleading HTTP status. Classifying the code once here
/// lets the rest of the crate match on meaning instead of numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeishuErrorCode {
    /// The access token is invalid, expired or revoked.
    TokenInvalid(i64),
    /// The caller lacks permission for the resource.
    Forbidden(i64),
    /// The resource does not exist (or is hidden from this caller).
    NotFound(i64),
    /// Request frequency limit hit.
    RateLimited,
    /// Platform-side failure worth retrying.
    ServerBusy(i64),
    /// HTTP status code fallback when the envelope is unparseable.
    HttpStatus(u16),
    /// A code this client doesn't classify yet.
    Other(i64),
}

impl FeishuErrorCode {
    /// Classifies an envelope `code` field.
    pub fn from_api_code(code: i64) -> Self {
        match code {
            99991661 | 99991663 | 99991664 | 99991665 | 99991668 | 99991671 | 99991677
            | 20005 | 20026 | 20037 | 20064 => Self::TokenInvalid(code),
            99991672 | 99991679 | 1770032 | 1254302 | 131006 | 91403 | 1061004 | 1063002
            | 230027 | 1069902 => Self::Forbidden(code),
            1770002 | 1254040 | 131005 | 91402 | 1061007 | 1069301 | 1254004 => {
                Self::NotFound(code)
            }
            99991400 | 1254290 | 90217 | 1770019 => Self::RateLimited,
            99991401..=99991499 | 1254607 | 1255040 | 90235 => Self::ServerBusy(code),
            other => Self::Other(other),
        }
    }

    /// Classifies a bare HTTP status when the body carried no envelope.
    pub fn from_http_status(status: u16) -> Self {
        Self::HttpStatus(status)
    }

    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::ServerBusy(_) => true,
            Self::HttpStatus(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the server rejected the access token itself.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::TokenInvalid(_) | Self::HttpStatus(401))
    }

    /// Whether the caller lacks access to the resource.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::Forbidden(_) | Self::NotFound(_) | Self::HttpStatus(403) | Self::HttpStatus(404)
        )
    }
}

impl fmt::Display for FeishuErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenInvalid(code) => write!(f, "token_invalid({})", code),
            Self::Forbidden(code) => write!(f, "forbidden({})", code),
            Self::NotFound(code) => write!(f, "not_found({})", code),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerBusy(code) => write!(f, "server_busy({})", code),
            Self::HttpStatus(code) => write!(f, "http_{}", code),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Structural defects in a fetched block list or wiki tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("document has no root block")]
    NoRoot,

    #[error("document has more than one root block: {}", roots.join(", "))]
    MultipleRoots { roots: Vec<String> },

    #[error("block '{block_id}' names parent '{parent_id}' which was not fetched")]
    OrphanBlock { block_id: String, parent_id: String },

    #[error("cycle through parent pointers at block '{block_id}'")]
    BlockCycle { block_id: String },

    #[error("wiki node '{node_token}' is listed as its own descendant")]
    WikiCycle { node_token: String },
}

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Unrecognized resource: {0}")]
    UnrecognizedResource(String),

    #[error("Authorization failed: {reason}")]
    Auth { reason: String },

    #[error("Transient fetch failure at {endpoint}: {cause}")]
    TransientFetch { endpoint: String, cause: String },

    #[error("Permission denied for {resource}: {message}")]
    Permission { resource: String, message: String },

    #[error("Media '{token}' unavailable: {reason}")]
    MediaUnavailable { token: String, reason: String },

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("Export cancelled")]
    Cancelled,

    #[error("Feishu API returned an error ({code}): {message}")]
    FeishuService {
        code: FeishuErrorCode,
        message: String,
        endpoint: String,
    },

    #[error("Network failure: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Filesystem IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("Output delivery failed: {}", failures.join(", "))]
    DeliveryFailed { failures: Vec<String> },

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(transparent)]
    ValidationError(#[from] crate::types::ValidationError),
}

impl AppError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::TransientFetch { .. } => true,
            AppError::FeishuService { code, .. } => code.is_retryable(),
            AppError::NetworkFailure(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Whether this failure must end the whole export.
    /// A rejected token that was not retried counts as an auth failure.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Auth { .. } | AppError::Cancelled => true,
            AppError::FeishuService { code, .. } => code.is_auth_rejection(),
            _ => false,
        }
    }

    /// Whether the platform denied access to the resource.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            AppError::Permission { .. } => true,
            AppError::FeishuService { code, .. } => code.is_permission_denied(),
            _ => false,
        }
    }

    /// Re-labels a platform permission failure with the resource it concerned.
    pub fn into_permission(self, resource: impl Into<String>) -> Self {
        match self {
            AppError::FeishuService { code, message, .. } if code.is_permission_denied() => {
                AppError::Permission {
                    resource: resource.into(),
                    message,
                }
            }
            other => other,
        }
    }
}

// Allow converting from anyhow::Error, preserving error chain
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError {
            message: err.to_string(),
            source: None,
        }
    }
}

impl From<std::fmt::Error> for AppError {
    fn from(err: std::fmt::Error) -> Self {
        AppError::InternalError {
            message: "Formatting error".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedResponse(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_codes_are_auth_rejections() {
        for code in [99991663, 99991668, 99991677] {
            let classified = FeishuErrorCode::from_api_code(code);
            assert!(classified.is_auth_rejection(), "{} should be auth", code);
            assert!(!classified.is_retryable());
        }
        assert!(FeishuErrorCode::from_http_status(401).is_auth_rejection());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FeishuErrorCode::from_api_code(99991400).is_retryable());
        assert!(FeishuErrorCode::from_http_status(503).is_retryable());
        assert!(FeishuErrorCode::from_http_status(429).is_retryable());
        assert!(!FeishuErrorCode::from_http_status(400).is_retryable());
        assert!(!FeishuErrorCode::from_api_code(1770032).is_retryable());
    }

    #[test]
    fn test_into_permission_relabels_forbidden() {
        let err = AppError::FeishuService {
            code: FeishuErrorCode::from_api_code(1770032),
            message: "forbidden".to_string(),
            endpoint: "docx/v1/documents/x/blocks".to_string(),
        };
        match err.into_permission("document x") {
            AppError::Permission { resource, .. } => assert_eq!(resource, "document x"),
            other => panic!("expected permission error, got {:?}", other),
        }
    }

    #[test]
    fn test_fatal_errors() {
        assert!(AppError::Cancelled.is_fatal());
        assert!(AppError::Auth {
            reason: "revoked".to_string()
        }
        .is_fatal());
        assert!(AppError::FeishuService {
            code: FeishuErrorCode::from_api_code(99991663),
            message: "invalid token".to_string(),
            endpoint: "x".to_string()
        }
        .is_fatal());
        assert!(!AppError::MediaUnavailable {
            token: "t".to_string(),
            reason: "403".to_string()
        }
        .is_fatal());
    }
}
