use thiserror::Error;

mod domain_types;
mod ids;
mod resource;

pub use domain_types::*;
pub use ids::*;
pub use resource::ResourceRef;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid token format: {0}")]
    InvalidToken(String),

    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unknown resource kind: {0}")]
    UnknownResourceKind(String),

    #[error("Empty required field: {0}")]
    EmptyField(&'static str),

    #[error("Value out of bounds: {value}, expected {min}..={max}")]
    OutOfBounds { value: u64, min: u64, max: u64 },

    #[error("Invalid access token: {reason}")]
    InvalidAccessToken { reason: String },

    #[error("Invalid option {option}: {reason}")]
    InvalidOption { option: &'static str, reason: String },
}
