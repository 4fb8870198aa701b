// src/api/types.rs
//! Type definitions for the Feishu API module.

use crate::error::AppError;
use crate::model::Block;
use crate::types::Warning;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    /// Cursor for the next page.
    pub page_token: Option<String>,
    pub has_more: bool,
    /// Items of this page that were dropped while parsing.
    pub warnings: Vec<Warning>,
}

impl<T> PaginatedResponse<T> {
    /// A final page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            page_token: None,
            has_more: false,
            warnings: Vec::new(),
        }
    }

    /// A page followed by another at `page_token`.
    pub fn more(items: Vec<T>, page_token: impl Into<String>) -> Self {
        Self {
            items,
            page_token: Some(page_token.into()),
            has_more: true,
            warnings: Vec::new(),
        }
    }
}

/// Result of pagination operations.
#[derive(Debug, Clone)]
pub struct PaginationResult<T> {
    pub items: Vec<T>,
    pub pages_fetched: u32,
}

/// A time-bounded, authorization-free download link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Asset bytes as they arrive.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, AppError>>;

/// Every block of one document, merged by id, with fetch diagnostics.
#[derive(Debug, Clone)]
pub struct FetchedBlocks {
    pub blocks: Vec<Block>,
    pub pages_fetched: u32,
    /// Cursor of the first page not read, when pagination stopped early.
    pub gap: Option<String>,
    pub warnings: Vec<Warning>,
}
