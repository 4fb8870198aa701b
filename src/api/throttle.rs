// src/api/throttle.rs
//! A repository decorator that bounds concurrent remote calls.
//!
//! Wiki nodes, media and embedded tables all fan out independently; routing
//! them through one [`ThrottledRepository`] keeps the number of open
//! requests at the configured concurrency for the whole export.

use super::types::{ByteStream, PaginatedResponse, TemporaryUrl};
use super::FeishuRepository;
use crate::error::AppError;
use crate::model::{
    BitableField, BitableRecord, BitableTable, Block, MediaReference, SpreadsheetInfo, WikiNode,
};
use crate::types::{BitableToken, DocumentId, SpreadsheetToken, WikiNodeToken};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admits at most `limit` calls into the inner repository at once.
pub struct ThrottledRepository {
    inner: Arc<dyn FeishuRepository>,
    permits: Arc<Semaphore>,
}

impl ThrottledRepository {
    pub fn new(inner: Arc<dyn FeishuRepository>, limit: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, AppError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::InternalError {
                message: format!("request limiter closed: {}", e),
                source: None,
            })
    }
}

#[async_trait::async_trait]
impl FeishuRepository for ThrottledRepository {
    async fn list_blocks(
        &self,
        document: &DocumentId,
        page_token: Option<&str>,
    ) -> Result<PaginatedResponse<Block>, AppError> {
        let _permit = self.permit().await?;
        self.inner.list_blocks(document, page_token).await
    }

    async fn temporary_download_url(
        &self,
        media: &MediaReference,
    ) -> Result<TemporaryUrl, AppError> {
        let _permit = self.permit().await?;
        self.inner.temporary_download_url(media).await
    }

    /// The permit stays with the stream until the body is consumed or dropped.
    async fn download_media(&self, media: &MediaReference) -> Result<ByteStream, AppError> {
        let permit = self.permit().await?;
        let stream = self.inner.download_media(media).await?;
        Ok(stream
            .map(move |chunk| {
                let _held = &permit;
                chunk
            })
            .boxed())
    }

    async fn wiki_node(&self, token: &WikiNodeToken) -> Result<WikiNode, AppError> {
        let _permit = self.permit().await?;
        self.inner.wiki_node(token).await
    }

    async fn wiki_children(
        &self,
        space_id: &str,
        parent: &WikiNodeToken,
    ) -> Result<Vec<WikiNode>, AppError> {
        let _permit = self.permit().await?;
        self.inner.wiki_children(space_id, parent).await
    }

    async fn spreadsheet_info(
        &self,
        token: &SpreadsheetToken,
    ) -> Result<SpreadsheetInfo, AppError> {
        let _permit = self.permit().await?;
        self.inner.spreadsheet_info(token).await
    }

    async fn sheet_values(
        &self,
        token: &SpreadsheetToken,
        sheet_id: &str,
    ) -> Result<Vec<Vec<Value>>, AppError> {
        let _permit = self.permit().await?;
        self.inner.sheet_values(token, sheet_id).await
    }

    async fn bitable_name(&self, app: &BitableToken) -> Result<String, AppError> {
        let _permit = self.permit().await?;
        self.inner.bitable_name(app).await
    }

    async fn bitable_tables(&self, app: &BitableToken) -> Result<Vec<BitableTable>, AppError> {
        let _permit = self.permit().await?;
        self.inner.bitable_tables(app).await
    }

    async fn bitable_fields(
        &self,
        app: &BitableToken,
        table_id: &str,
        view_id: Option<&str>,
    ) -> Result<Vec<BitableField>, AppError> {
        let _permit = self.permit().await?;
        self.inner.bitable_fields(app, table_id, view_id).await
    }

    async fn bitable_records(
        &self,
        app: &BitableToken,
        table_id: &str,
        view_id: Option<&str>,
    ) -> Result<Vec<BitableRecord>, AppError> {
        let _permit = self.permit().await?;
        self.inner.bitable_records(app, table_id, view_id).await
    }

    async fn user_name(&self, user_id: &str) -> Result<String, AppError> {
        let _permit = self.permit().await?;
        self.inner.user_name(user_id).await
    }
}
