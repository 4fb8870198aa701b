// src/api/mod.rs
//! Feishu API interaction — the ability to retrieve content from a tenant.
//!
//! This module provides a data-oriented interface to the Feishu Open
//! Platform, with clear separation between I/O operations, parsing, and
//! business logic.

mod block_fetcher;
pub mod client;
pub mod memory;
mod pagination;
pub mod parser;
mod responses;
mod throttle;
mod types;

use crate::error::AppError;
use crate::model::{
    BitableField, BitableRecord, BitableTable, Block, MediaReference, SpreadsheetInfo, WikiNode,
};
use crate::types::{BitableToken, DocumentId, SpreadsheetToken, WikiNodeToken};
use serde_json::Value;

/// The ability to retrieve content from a Feishu tenant.
///
/// This is the fundamental algebra for API interaction.
/// Business logic depends on this trait, never on HTTP details.
/// Implementations make one logical attempt per call; retrying transient
/// failures is the caller's decision.
#[async_trait::async_trait]
pub trait FeishuRepository: Send + Sync {
    /// One page of a document's flat block listing.
    async fn list_blocks(
        &self,
        document: &DocumentId,
        page_token: Option<&str>,
    ) -> Result<PaginatedResponse<Block>, AppError>;

    /// A short-lived download link for an image or file.
    async fn temporary_download_url(
        &self,
        media: &MediaReference,
    ) -> Result<TemporaryUrl, AppError>;

    /// The raw bytes of an image, file or whiteboard rendering.
    async fn download_media(&self, media: &MediaReference) -> Result<ByteStream, AppError>;

    async fn wiki_node(&self, token: &WikiNodeToken) -> Result<WikiNode, AppError>;

    /// Every direct child of a wiki node, in server order.
    async fn wiki_children(
        &self,
        space_id: &str,
        parent: &WikiNodeToken,
    ) -> Result<Vec<WikiNode>, AppError>;

    async fn spreadsheet_info(&self, token: &SpreadsheetToken)
        -> Result<SpreadsheetInfo, AppError>;

    /// Cell values of one sheet, row-major.
    async fn sheet_values(
        &self,
        token: &SpreadsheetToken,
        sheet_id: &str,
    ) -> Result<Vec<Vec<Value>>, AppError>;

    async fn bitable_name(&self, app: &BitableToken) -> Result<String, AppError>;

    async fn bitable_tables(&self, app: &BitableToken) -> Result<Vec<BitableTable>, AppError>;

    async fn bitable_fields(
        &self,
        app: &BitableToken,
        table_id: &str,
        view_id: Option<&str>,
    ) -> Result<Vec<BitableField>, AppError>;

    async fn bitable_records(
        &self,
        app: &BitableToken,
        table_id: &str,
        view_id: Option<&str>,
    ) -> Result<Vec<BitableRecord>, AppError>;

    /// Display name of a user, for rendering mentions.
    async fn user_name(&self, user_id: &str) -> Result<String, AppError>;
}

// Re-export the public interface
pub use block_fetcher::BlockFetcher;
pub use client::{ApiResponse, FeishuHttpClient};
pub use memory::InMemoryRepository;
pub use pagination::fetch_all_pages;
pub use throttle::ThrottledRepository;
pub use types::{ByteStream, FetchedBlocks, PaginatedResponse, PaginationResult, TemporaryUrl};
