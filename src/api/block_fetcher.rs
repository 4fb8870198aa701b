// src/api/block_fetcher.rs
//! Retrieves every block of one document.
//!
//! Pages are requested strictly in cursor order and merged by block id:
//! a block seen twice keeps its first position and its last content. A
//! permission denial on a later page leaves a gap instead of failing the
//! document.

use super::types::FetchedBlocks;
use super::FeishuRepository;
use crate::cancel::CancelToken;
use crate::constants::MAX_PAGES_PER_LISTING;
use crate::error::AppError;
use crate::error_recovery::{retry_with_backoff, RetryPolicy};
use crate::model::Block;
use crate::progress::{NoopObserver, ProgressEvent, ProgressObserver};
use crate::types::{BlockId, DocumentId, Warning, WarningKind};
use indexmap::IndexMap;
use std::sync::Arc;

/// Fetches the flat block list of a document.
pub struct BlockFetcher {
    repository: Arc<dyn FeishuRepository>,
    retry: RetryPolicy,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancelToken,
    max_pages: u32,
}

impl BlockFetcher {
    pub fn new(repository: Arc<dyn FeishuRepository>) -> Self {
        Self {
            repository,
            retry: RetryPolicy::default(),
            observer: Arc::new(NoopObserver),
            cancel: CancelToken::new(),
            max_pages: MAX_PAGES_PER_LISTING,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Fetches and merges every page of `document`'s block listing.
    ///
    /// Fails with `Permission` when the first page is denied; a denial on a
    /// later page ends pagination with a `PermissionGap` warning, and the
    /// page limit with a `Truncated` one.
    pub async fn fetch_all_blocks(&self, document: &DocumentId) -> Result<FetchedBlocks, AppError> {
        let mut merged: IndexMap<BlockId, Block> = IndexMap::new();
        let mut warnings = Vec::new();
        let mut gap = None;
        let mut cursor: Option<String> = None;
        let mut pages_fetched = 0u32;

        loop {
            self.cancel.check()?;

            if pages_fetched >= self.max_pages {
                log::warn!(
                    "Document {} exceeded {} block pages; truncating",
                    document,
                    self.max_pages
                );
                warnings.push(
                    Warning::new(
                        WarningKind::Truncated,
                        format!("blocks after page {} were not fetched", pages_fetched),
                    )
                    .with_context(document.to_string()),
                );
                gap = cursor.clone();
                break;
            }

            let page = retry_with_backoff(
                || self.repository.list_blocks(document, cursor.as_deref()),
                self.retry,
            )
            .await;

            let page = match page {
                Ok(page) => page,
                Err(e) if e.is_permission_denied() && pages_fetched == 0 => {
                    return Err(e.into_permission(format!("document {}", document)));
                }
                Err(e) if e.is_permission_denied() => {
                    let position = cursor.clone().unwrap_or_default();
                    log::warn!(
                        "Permission denied on page {} of document {}: {}",
                        pages_fetched + 1,
                        document,
                        e
                    );
                    warnings.push(
                        Warning::new(
                            WarningKind::PermissionGap,
                            format!(
                                "blocks after page {} could not be read: {}",
                                pages_fetched, e
                            ),
                        )
                        .with_context(document.to_string()),
                    );
                    gap = Some(position);
                    break;
                }
                Err(e) => return Err(e),
            };

            pages_fetched += 1;
            warnings.extend(
                page.warnings
                    .into_iter()
                    .map(|w| w.with_context(document.to_string())),
            );
            for block in page.items {
                // Later content wins, first position stays.
                merged.insert(block.id.clone(), block);
            }

            self.observer.on_event(ProgressEvent::PageFetched {
                document_id: document.to_string(),
                pages: pages_fetched,
                blocks: merged.len(),
            });
            log::debug!(
                "Fetched page {} of {} ({} blocks so far)",
                pages_fetched,
                document,
                merged.len()
            );

            let next = page.page_token.filter(|t| !t.is_empty());
            if !page.has_more || next.is_none() {
                break;
            }
            if next == cursor {
                log::warn!("Server repeated page token for {}; stopping", document);
                break;
            }
            cursor = next;
        }

        Ok(FetchedBlocks {
            blocks: merged.into_values().collect(),
            pages_fetched,
            gap,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::InMemoryRepository;
    use crate::model::{BlockContent, TextPayload};
    use pretty_assertions::assert_eq;

    fn text(id: &str, content: &str) -> Block {
        Block::new(id, BlockContent::Text(TextPayload::plain(content))).with_parent("root")
    }

    fn fetcher(repository: InMemoryRepository) -> (BlockFetcher, Arc<InMemoryRepository>) {
        let repository = Arc::new(repository);
        let fetcher = BlockFetcher::new(repository.clone()).with_retry(RetryPolicy::immediate(2));
        (fetcher, repository)
    }

    #[tokio::test]
    async fn test_duplicate_across_pages_keeps_first_position_last_content() {
        let (fetcher, repository) = fetcher(InMemoryRepository::new().with_document_pages(
            "doc1",
            vec![
                vec![text("a", "old"), text("b", "b")],
                vec![text("c", "c"), text("a", "new")],
            ],
        ));

        let fetched = fetcher
            .fetch_all_blocks(&DocumentId::from_raw("doc1"))
            .await
            .unwrap();

        let ids: Vec<&str> = fetched.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            fetched.blocks[0].content,
            BlockContent::Text(TextPayload::plain("new"))
        );
        assert_eq!(fetched.pages_fetched, 2);
        assert_eq!(
            repository.requests(),
            vec!["blocks:doc1:0".to_string(), "blocks:doc1:1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_denied_first_page_is_permission_error() {
        let (fetcher, _) = fetcher(
            InMemoryRepository::new()
                .with_document("doc1", vec![])
                .failing("blocks:doc1:0", 1770032),
        );
        let result = fetcher.fetch_all_blocks(&DocumentId::from_raw("doc1")).await;
        assert!(matches!(result, Err(AppError::Permission { .. })));
    }

    #[tokio::test]
    async fn test_denied_later_page_leaves_gap() {
        let (fetcher, _) = fetcher(
            InMemoryRepository::new()
                .with_document_pages("doc1", vec![vec![text("a", "a")], vec![text("b", "b")]])
                .failing("blocks:doc1:1", 1770032),
        );

        let fetched = fetcher
            .fetch_all_blocks(&DocumentId::from_raw("doc1"))
            .await
            .unwrap();

        assert_eq!(fetched.blocks.len(), 1);
        assert_eq!(fetched.gap.as_deref(), Some("page-1"));
        assert_eq!(fetched.warnings.len(), 1);
        assert_eq!(fetched.warnings[0].kind, WarningKind::PermissionGap);
    }

    #[tokio::test]
    async fn test_page_limit_is_reported_as_warning() {
        let (fetcher, repository) = fetcher(InMemoryRepository::new().with_document_pages(
            "doc1",
            vec![
                vec![text("a", "a")],
                vec![text("b", "b")],
                vec![text("c", "c")],
            ],
        ));
        let fetcher = fetcher.with_max_pages(2);

        let fetched = fetcher
            .fetch_all_blocks(&DocumentId::from_raw("doc1"))
            .await
            .unwrap();

        assert_eq!(fetched.blocks.len(), 2);
        assert_eq!(fetched.pages_fetched, 2);
        assert_eq!(fetched.gap.as_deref(), Some("page-2"));
        assert_eq!(fetched.warnings.len(), 1);
        assert_eq!(fetched.warnings[0].kind, WarningKind::Truncated);
        assert_eq!(fetched.warnings[0].context.as_deref(), Some("doc1"));
        assert_eq!(repository.request_count("blocks:"), 2);
    }

    #[tokio::test]
    async fn test_transient_page_failure_is_retried() {
        let (fetcher, repository) = fetcher(
            InMemoryRepository::new()
                .with_document("doc1", vec![text("a", "a")])
                .failing_times("blocks:doc1:0", 99991400, 1),
        );

        let fetched = fetcher
            .fetch_all_blocks(&DocumentId::from_raw("doc1"))
            .await
            .unwrap();

        assert_eq!(fetched.blocks.len(), 1);
        assert_eq!(repository.request_count("blocks:"), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let (fetcher, repository) =
            fetcher(InMemoryRepository::new().with_document("doc1", vec![]));
        let cancel = CancelToken::new();
        cancel.cancel();
        let fetcher = fetcher.with_cancel(cancel);

        let result = fetcher.fetch_all_blocks(&DocumentId::from_raw("doc1")).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(repository.requests().is_empty());
    }
}
