// src/api/pagination.rs
//! Cursor pagination without BoxFuture.

use super::types::{PaginatedResponse, PaginationResult};
use crate::error::AppError;

/// Fetches every page of a cursor listing using an async closure.
///
/// Stops when the server reports no further pages, returns no cursor,
/// repeats the previous cursor, or `max_pages` is reached.
pub async fn fetch_all_pages<T, F, Fut>(
    mut fetch_fn: F,
    page_size: u32,
    max_pages: Option<u32>,
) -> Result<PaginationResult<T>, AppError>
where
    T: Send + 'static,
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: std::future::Future<Output = Result<PaginatedResponse<T>, AppError>>,
{
    let mut all_items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages_fetched = 0u32;

    loop {
        if let Some(max) = max_pages {
            if pages_fetched >= max {
                log::warn!("Reached maximum page limit: {}", max);
                break;
            }
        }

        let response = fetch_fn(page_size, cursor.clone()).await?;
        pages_fetched += 1;
        all_items.extend(response.items);

        let next = response.page_token.filter(|t| !t.is_empty());
        if !response.has_more || next.is_none() {
            break;
        }
        if next == cursor {
            log::warn!("Server repeated page token; stopping pagination");
            break;
        }
        cursor = next;
    }

    Ok(PaginationResult {
        items: all_items,
        pages_fetched,
    })
}
