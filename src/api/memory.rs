// src/api/memory.rs
//! An in-memory repository serving canned content.
//!
//! Exports run against it exactly as against the HTTP client, which makes
//! it the backbone of the test suite. Failures are scripted per request key
//! as platform error codes, optionally for a limited number of calls.

use super::types::{ByteStream, PaginatedResponse, TemporaryUrl};
use super::FeishuRepository;
use crate::constants::TEMPORARY_URL_VALIDITY_SECS;
use crate::error::{AppError, FeishuErrorCode};
use crate::model::{
    BitableField, BitableRecord, BitableTable, Block, MediaKind, MediaReference, SpreadsheetInfo,
    WikiNode,
};
use crate::types::{BitableToken, DocumentId, SpreadsheetToken, WikiNodeToken};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct ScriptedFailure {
    code: i64,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Debug, Clone, Default)]
struct BitableFixture {
    name: String,
    tables: Vec<BitableTable>,
    fields: HashMap<String, Vec<BitableField>>,
    records: HashMap<String, Vec<BitableRecord>>,
}

/// Canned Feishu content addressed by token.
#[derive(Default)]
pub struct InMemoryRepository {
    documents: HashMap<String, Vec<Vec<Block>>>,
    media: HashMap<String, Vec<u8>>,
    wiki_nodes: HashMap<String, WikiNode>,
    wiki_children: HashMap<String, Vec<String>>,
    spreadsheets: HashMap<String, SpreadsheetInfo>,
    sheet_values: HashMap<(String, String), Vec<Vec<Value>>>,
    bitables: HashMap<String, BitableFixture>,
    users: HashMap<String, String>,
    failures: Mutex<HashMap<String, ScriptedFailure>>,
    requests: Mutex<Vec<String>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document served as one page per inner vector.
    pub fn with_document_pages(mut self, document: &str, pages: Vec<Vec<Block>>) -> Self {
        self.documents.insert(document.to_string(), pages);
        self
    }

    /// A document served as a single page.
    pub fn with_document(self, document: &str, blocks: Vec<Block>) -> Self {
        self.with_document_pages(document, vec![blocks])
    }

    pub fn with_media(mut self, token: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.media.insert(token.to_string(), bytes.into());
        self
    }

    /// A wiki node and the tokens of its children, in listing order.
    pub fn with_wiki_node(mut self, node: WikiNode, children: &[&str]) -> Self {
        let token = node.node_token.to_string();
        self.wiki_children
            .insert(token.clone(), children.iter().map(|c| c.to_string()).collect());
        self.wiki_nodes.insert(token, node);
        self
    }

    pub fn with_spreadsheet(
        mut self,
        token: &str,
        info: SpreadsheetInfo,
        values: Vec<(&str, Vec<Vec<Value>>)>,
    ) -> Self {
        for (sheet_id, rows) in values {
            self.sheet_values
                .insert((token.to_string(), sheet_id.to_string()), rows);
        }
        self.spreadsheets.insert(token.to_string(), info);
        self
    }

    pub fn with_bitable_table(
        mut self,
        app: &str,
        app_name: &str,
        table: BitableTable,
        fields: Vec<BitableField>,
        records: Vec<BitableRecord>,
    ) -> Self {
        let fixture = self.bitables.entry(app.to_string()).or_default();
        fixture.name = app_name.to_string();
        fixture.fields.insert(table.table_id.clone(), fields);
        fixture.records.insert(table.table_id.clone(), records);
        fixture.tables.push(table);
        self
    }

    pub fn with_user(mut self, user_id: &str, name: &str) -> Self {
        self.users.insert(user_id.to_string(), name.to_string());
        self
    }

    /// Fails every request with `key` using platform error `code`.
    ///
    /// Keys: `blocks:<doc>:<page>`, `tmp_url:<token>`, `download:<token>`,
    /// `stream:<token>` (fails after the first chunk), `wiki_node:<token>`,
    /// `wiki_children:<token>`, `sheet:<token>`, `bitable:<app>`,
    /// `user:<id>`.
    pub fn failing(self, key: &str, code: i64) -> Self {
        self.failures.lock().insert(
            key.to_string(),
            ScriptedFailure {
                code,
                remaining: None,
            },
        );
        self
    }

    /// Fails the first `times` requests with `key`, then serves normally.
    pub fn failing_times(self, key: &str, code: i64, times: u32) -> Self {
        self.failures.lock().insert(
            key.to_string(),
            ScriptedFailure {
                code,
                remaining: Some(times),
            },
        );
        self
    }

    /// Holds every request open for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The most requests that were open at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Every request key served so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// How many requests started with `prefix`.
    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    async fn enter(&self, key: String) -> Result<(), AppError> {
        self.requests.lock().push(key.clone());
        if let Some(latency) = self.latency {
            let open = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(open, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.scripted(&key)
    }

    fn scripted(&self, key: &str) -> Result<(), AppError> {
        let mut failures = self.failures.lock();
        let Some(failure) = failures.get_mut(key) else {
            return Ok(());
        };
        match failure.remaining {
            Some(0) => Ok(()),
            Some(ref mut n) => {
                *n -= 1;
                Err(service_error(key, failure.code))
            }
            None => Err(service_error(key, failure.code)),
        }
    }
}

fn service_error(key: &str, code: i64) -> AppError {
    AppError::FeishuService {
        code: FeishuErrorCode::from_api_code(code),
        message: format!("scripted failure {}", code),
        endpoint: key.to_string(),
    }
}

fn not_found(key: &str) -> AppError {
    service_error(key, 1770002)
}

fn page_index(page_token: Option<&str>) -> Result<usize, AppError> {
    match page_token {
        None => Ok(0),
        Some(token) => token
            .strip_prefix("page-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| AppError::MalformedResponse(format!("unknown page token {}", token))),
    }
}

#[async_trait::async_trait]
impl FeishuRepository for InMemoryRepository {
    async fn list_blocks(
        &self,
        document: &DocumentId,
        page_token: Option<&str>,
    ) -> Result<PaginatedResponse<Block>, AppError> {
        let index = page_index(page_token)?;
        let key = format!("blocks:{}:{}", document, index);
        self.enter(key.clone()).await?;

        let pages = self.documents.get(document.as_str()).ok_or_else(|| not_found(&key))?;
        let items = pages.get(index).cloned().unwrap_or_default();
        if index + 1 < pages.len() {
            Ok(PaginatedResponse::more(items, format!("page-{}", index + 1)))
        } else {
            Ok(PaginatedResponse::last(items))
        }
    }

    async fn temporary_download_url(
        &self,
        media: &MediaReference,
    ) -> Result<TemporaryUrl, AppError> {
        let key = format!("tmp_url:{}", media.token);
        self.enter(key.clone()).await?;

        if media.kind == MediaKind::Board || !self.media.contains_key(&media.token) {
            return Err(AppError::MediaUnavailable {
                token: media.token.clone(),
                reason: "no temporary download link was issued".to_string(),
            });
        }
        Ok(TemporaryUrl {
            url: format!("https://files.example.test/{}", media.token),
            expires_at: chrono::Utc::now()
                + chrono::Duration::seconds(TEMPORARY_URL_VALIDITY_SECS),
        })
    }

    async fn download_media(&self, media: &MediaReference) -> Result<ByteStream, AppError> {
        let key = format!("download:{}", media.token);
        self.enter(key.clone()).await?;

        let bytes = self.media.get(&media.token).cloned().ok_or_else(|| not_found(&key))?;
        let middle = bytes.len() / 2;
        let (head, tail) = bytes.split_at(middle);
        let first: Result<Vec<u8>, AppError> = Ok(head.to_vec());
        let second = self
            .scripted(&format!("stream:{}", media.token))
            .map(|_| tail.to_vec());

        Ok(futures::stream::iter(vec![first, second]).boxed())
    }

    async fn wiki_node(&self, token: &WikiNodeToken) -> Result<WikiNode, AppError> {
        let key = format!("wiki_node:{}", token);
        self.enter(key.clone()).await?;
        self.wiki_nodes
            .get(token.as_str())
            .cloned()
            .ok_or_else(|| not_found(&key))
    }

    async fn wiki_children(
        &self,
        _space_id: &str,
        parent: &WikiNodeToken,
    ) -> Result<Vec<WikiNode>, AppError> {
        let key = format!("wiki_children:{}", parent);
        self.enter(key.clone()).await?;
        let children = self.wiki_children.get(parent.as_str()).cloned().unwrap_or_default();
        children
            .iter()
            .map(|child| {
                self.wiki_nodes
                    .get(child)
                    .cloned()
                    .ok_or_else(|| not_found(&key))
            })
            .collect()
    }

    async fn spreadsheet_info(
        &self,
        token: &SpreadsheetToken,
    ) -> Result<SpreadsheetInfo, AppError> {
        let key = format!("sheet:{}", token);
        self.enter(key.clone()).await?;
        self.spreadsheets
            .get(token.as_str())
            .cloned()
            .ok_or_else(|| not_found(&key))
    }

    async fn sheet_values(
        &self,
        token: &SpreadsheetToken,
        sheet_id: &str,
    ) -> Result<Vec<Vec<Value>>, AppError> {
        let key = format!("sheet:{}", token);
        self.enter(format!("{}/{}", key, sheet_id)).await?;
        self.scripted(&key)?;
        self.sheet_values
            .get(&(token.to_string(), sheet_id.to_string()))
            .cloned()
            .ok_or_else(|| not_found(&key))
    }

    async fn bitable_name(&self, app: &BitableToken) -> Result<String, AppError> {
        let key = format!("bitable:{}", app);
        self.enter(key.clone()).await?;
        self.bitables
            .get(app.as_str())
            .map(|b| b.name.clone())
            .ok_or_else(|| not_found(&key))
    }

    async fn bitable_tables(&self, app: &BitableToken) -> Result<Vec<BitableTable>, AppError> {
        let key = format!("bitable:{}", app);
        self.enter(format!("{}/tables", key)).await?;
        self.scripted(&key)?;
        self.bitables
            .get(app.as_str())
            .map(|b| b.tables.clone())
            .ok_or_else(|| not_found(&key))
    }

    async fn bitable_fields(
        &self,
        app: &BitableToken,
        table_id: &str,
        _view_id: Option<&str>,
    ) -> Result<Vec<BitableField>, AppError> {
        let key = format!("bitable:{}", app);
        self.enter(format!("{}/{}/fields", key, table_id)).await?;
        self.scripted(&key)?;
        self.bitables
            .get(app.as_str())
            .and_then(|b| b.fields.get(table_id).cloned())
            .ok_or_else(|| not_found(&key))
    }

    async fn bitable_records(
        &self,
        app: &BitableToken,
        table_id: &str,
        _view_id: Option<&str>,
    ) -> Result<Vec<BitableRecord>, AppError> {
        let key = format!("bitable:{}", app);
        self.enter(format!("{}/{}/records", key, table_id)).await?;
        self.scripted(&key)?;
        self.bitables
            .get(app.as_str())
            .and_then(|b| b.records.get(table_id).cloned())
            .ok_or_else(|| not_found(&key))
    }

    async fn user_name(&self, user_id: &str) -> Result<String, AppError> {
        let key = format!("user:{}", user_id);
        self.enter(key.clone()).await?;
        self.users.get(user_id).cloned().ok_or_else(|| not_found(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockContent, TextPayload};

    #[tokio::test]
    async fn test_pages_chain_through_tokens() {
        let block = Block::new("a", BlockContent::Text(TextPayload::plain("a")));
        let repository = InMemoryRepository::new()
            .with_document_pages("doc1", vec![vec![block.clone()], vec![block]]);
        let doc = DocumentId::from_raw("doc1");

        let first = repository.list_blocks(&doc, None).await.unwrap();
        assert_eq!(first.page_token.as_deref(), Some("page-1"));
        let second = repository.list_blocks(&doc, Some("page-1")).await.unwrap();
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_limited_failures_recover() {
        let repository = InMemoryRepository::new()
            .with_user("ou_1", "Ada")
            .failing_times("user:ou_1", 99991400, 1);

        assert!(repository.user_name("ou_1").await.unwrap_err().is_transient());
        assert_eq!(repository.user_name("ou_1").await.unwrap(), "Ada");
        assert_eq!(repository.request_count("user:"), 2);
    }
}
