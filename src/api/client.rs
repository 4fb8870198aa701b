// src/api/client.rs
//! Pure HTTP client wrapper for the Feishu Open Platform.
//!
//! This module provides a thin wrapper around reqwest for making
//! HTTP requests to the Feishu API. It attaches the current access token,
//! honours cancellation, and replays a request once when the server rejects
//! the token. It does not retry anything else.

use super::pagination::fetch_all_pages;
use super::parser;
use super::responses::{
    BitableAppData, PageData, RawBitableField, RawBitableRecord, RawBitableTable, RawWikiNode,
    SheetValuesData, SheetsQueryData, SpreadsheetData, TmpDownloadUrls, UserData, WikiNodeData,
};
use super::types::{ByteStream, PaginatedResponse, TemporaryUrl};
use super::FeishuRepository;
use crate::auth::TokenSource;
use crate::cancel::CancelToken;
use crate::constants::{
    BITABLE_PAGE_SIZE, BLOCK_PAGE_SIZE, MAX_PAGES_PER_LISTING, TEMPORARY_URL_VALIDITY_SECS,
    WIKI_PAGE_SIZE,
};
use crate::error::AppError;
use crate::model::{
    BitableField, BitableRecord, BitableTable, Block, MediaKind, MediaReference, SheetInfo,
    SpreadsheetInfo, WikiNode,
};
use crate::types::{AccessToken, BitableToken, DocumentId, SpreadsheetToken, WikiNodeToken};
use futures::StreamExt;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A thin wrapper around reqwest Client for Feishu API requests.
#[derive(Clone)]
pub struct FeishuHttpClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    cancel: CancelToken,
}

impl FeishuHttpClient {
    /// Creates a client against `base_url` (the Feishu or Lark host).
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        timeout: Duration,
        cancel: CancelToken,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("feishu2md/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            cancel,
        })
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/open-apis/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends one request and returns the envelope's `data`.
    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        self.with_token_replay(path, |token| {
            let method = method.clone();
            async move { self.send_once(&token, method, path, query, body).await }
        })
        .await
    }

    /// Runs `send` with the current token. When the server rejects that
    /// token, the source is asked for a replacement and `send` runs exactly
    /// once more; a second rejection is an `Auth` error.
    async fn with_token_replay<T, F, Fut>(&self, path: &str, send: F) -> Result<T, AppError>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let token = self.tokens.valid_token().await?;
        match send(token.clone()).await {
            Err(e) if is_auth_rejection(&e) => {
                log::info!("Access token rejected at {}; refreshing", path);
                let fresh = self.tokens.reject(&token).await?;
                send(fresh).await.map_err(|e| {
                    if is_auth_rejection(&e) {
                        AppError::Auth {
                            reason: format!("refreshed token was also rejected: {}", e),
                        }
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }

    async fn send_once(
        &self,
        token: &AccessToken,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        let url = self.endpoint_url(path);
        log::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(token.as_str())
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self
            .cancel
            .guard(request.send())
            .await?
            .map_err(|e| transport_error(path, e))?;
        let result = self
            .cancel
            .guard(extract_response_text(response))
            .await??;
        parser::parse_envelope(result, path)
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let data = self.call(Method::GET, path, query, None).await?;
        parser::parse_data(data, path)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<PaginatedResponse<T>, AppError> {
        let page: PageData<T> = self.get_data(path, query).await?;
        Ok(into_paginated(page))
    }

    /// Opens a download, replaying once on token rejection.
    async fn open_download(&self, path: &str) -> Result<Response, AppError> {
        self.with_token_replay(path, |token| async move {
            self.open_download_once(&token, path).await
        })
        .await
    }

    async fn open_download_once(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> Result<Response, AppError> {
        let url = self.endpoint_url(path);
        log::debug!("GET {} (download)", url);

        let response = self
            .cancel
            .guard(self.client.get(&url).bearer_auth(token.as_str()).send())
            .await?
            .map_err(|e| transport_error(path, e))?;

        if response.status().is_success() {
            return Ok(response);
        }

        // Error bodies still carry the JSON envelope.
        let result = extract_response_text(response).await?;
        match parser::parse_envelope(result, path) {
            Err(e) => Err(e),
            Ok(_) => Err(AppError::MalformedResponse(format!(
                "{}: download failed without an error code",
                path
            ))),
        }
    }
}

fn is_auth_rejection(error: &AppError) -> bool {
    matches!(error, AppError::FeishuService { code, .. } if code.is_auth_rejection())
}

fn transport_error(endpoint: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() || error.is_connect() {
        AppError::TransientFetch {
            endpoint: endpoint.to_string(),
            cause: error.to_string(),
        }
    } else {
        AppError::NetworkFailure(error)
    }
}

fn into_paginated<T>(page: PageData<T>) -> PaginatedResponse<T> {
    PaginatedResponse {
        items: page.items,
        page_token: page.page_token.filter(|t| !t.is_empty()),
        has_more: page.has_more,
        warnings: Vec::new(),
    }
}

fn page_query(page_size: u32, cursor: Option<String>) -> Vec<(&'static str, String)> {
    let mut query = vec![("page_size", page_size.to_string())];
    if let Some(cursor) = cursor {
        query.push(("page_token", cursor));
    }
    query
}

#[async_trait::async_trait]
impl FeishuRepository for FeishuHttpClient {
    async fn list_blocks(
        &self,
        document: &DocumentId,
        page_token: Option<&str>,
    ) -> Result<PaginatedResponse<Block>, AppError> {
        let path = format!("docx/v1/documents/{}/blocks", document);
        let mut query = page_query(BLOCK_PAGE_SIZE, page_token.map(str::to_string));
        query.push(("document_revision_id", "-1".to_string()));

        let data = self.call(Method::GET, &path, &query, None).await?;
        parser::parse_blocks_page(data)
    }

    async fn temporary_download_url(
        &self,
        media: &MediaReference,
    ) -> Result<TemporaryUrl, AppError> {
        if media.kind == MediaKind::Board {
            return Err(AppError::MediaUnavailable {
                token: media.token.clone(),
                reason: "whiteboards have no temporary download link".to_string(),
            });
        }

        let path = "drive/v1/medias/batch_get_tmp_download_url";
        let urls: TmpDownloadUrls = self
            .get_data(path, &[("file_tokens", media.token.clone())])
            .await?;

        urls.tmp_download_urls
            .into_iter()
            .find(|u| u.file_token == media.token)
            .map(|u| TemporaryUrl {
                url: u.tmp_download_url,
                expires_at: chrono::Utc::now()
                    + chrono::Duration::seconds(TEMPORARY_URL_VALIDITY_SECS),
            })
            .ok_or_else(|| AppError::MediaUnavailable {
                token: media.token.clone(),
                reason: "no temporary download link was issued".to_string(),
            })
    }

    async fn download_media(&self, media: &MediaReference) -> Result<ByteStream, AppError> {
        let path = match media.kind {
            MediaKind::Board => format!("board/v1/whiteboards/{}/download_as_image", media.token),
            MediaKind::Image | MediaKind::File => {
                format!("drive/v1/medias/{}/download", media.token)
            }
        };

        let response = self.open_download(&path).await?;
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map(|bytes| bytes.to_vec()).map_err(|e| {
                if e.is_timeout() {
                    AppError::TransientFetch {
                        endpoint: path.clone(),
                        cause: e.to_string(),
                    }
                } else {
                    AppError::NetworkFailure(e)
                }
            })
        });
        Ok(stream.boxed())
    }

    async fn wiki_node(&self, token: &WikiNodeToken) -> Result<WikiNode, AppError> {
        let data: WikiNodeData = self
            .get_data("wiki/v2/spaces/get_node", &[("token", token.to_string())])
            .await?;
        Ok(parser::wiki_node_from_raw(data.node))
    }

    async fn wiki_children(
        &self,
        space_id: &str,
        parent: &WikiNodeToken,
    ) -> Result<Vec<WikiNode>, AppError> {
        let path = format!("wiki/v2/spaces/{}/nodes", space_id);
        let result = fetch_all_pages(
            |page_size, cursor| {
                let mut query = page_query(page_size, cursor);
                query.push(("parent_node_token", parent.to_string()));
                let path = path.clone();
                async move { self.get_page::<RawWikiNode>(&path, &query).await }
            },
            WIKI_PAGE_SIZE,
            Some(MAX_PAGES_PER_LISTING),
        )
        .await?;

        Ok(result
            .items
            .into_iter()
            .map(parser::wiki_node_from_raw)
            .collect())
    }

    async fn spreadsheet_info(
        &self,
        token: &SpreadsheetToken,
    ) -> Result<SpreadsheetInfo, AppError> {
        let meta: SpreadsheetData = self
            .get_data(&format!("sheets/v3/spreadsheets/{}", token), &[])
            .await?;
        let query: SheetsQueryData = self
            .get_data(&format!("sheets/v3/spreadsheets/{}/sheets/query", token), &[])
            .await?;

        let mut sheets = query.sheets;
        sheets.sort_by_key(|s| s.index);

        Ok(SpreadsheetInfo {
            title: meta.spreadsheet.title,
            sheets: sheets
                .into_iter()
                .map(|s| SheetInfo {
                    sheet_id: s.sheet_id,
                    title: s.title,
                })
                .collect(),
        })
    }

    async fn sheet_values(
        &self,
        token: &SpreadsheetToken,
        sheet_id: &str,
    ) -> Result<Vec<Vec<Value>>, AppError> {
        let data: SheetValuesData = self
            .get_data(
                &format!("sheets/v2/spreadsheets/{}/values/{}", token, sheet_id),
                &[("valueRenderOption", "ToString".to_string())],
            )
            .await?;
        Ok(data.value_range.values)
    }

    async fn bitable_name(&self, app: &BitableToken) -> Result<String, AppError> {
        let data: BitableAppData = self
            .get_data(&format!("bitable/v1/apps/{}", app), &[])
            .await?;
        Ok(data.app.name)
    }

    async fn bitable_tables(&self, app: &BitableToken) -> Result<Vec<BitableTable>, AppError> {
        let path = format!("bitable/v1/apps/{}/tables", app);
        let result = fetch_all_pages(
            |page_size, cursor| {
                let query = page_query(page_size, cursor);
                let path = path.clone();
                async move { self.get_page::<RawBitableTable>(&path, &query).await }
            },
            BITABLE_PAGE_SIZE,
            Some(MAX_PAGES_PER_LISTING),
        )
        .await?;

        Ok(result
            .items
            .into_iter()
            .map(|t| BitableTable {
                table_id: t.table_id,
                name: t.name,
            })
            .collect())
    }

    async fn bitable_fields(
        &self,
        app: &BitableToken,
        table_id: &str,
        view_id: Option<&str>,
    ) -> Result<Vec<BitableField>, AppError> {
        let path = format!("bitable/v1/apps/{}/tables/{}/fields", app, table_id);
        let result = fetch_all_pages(
            |page_size, cursor| {
                let mut query = page_query(page_size, cursor);
                if let Some(view) = view_id {
                    query.push(("view_id", view.to_string()));
                }
                let path = path.clone();
                async move { self.get_page::<RawBitableField>(&path, &query).await }
            },
            BITABLE_PAGE_SIZE,
            Some(MAX_PAGES_PER_LISTING),
        )
        .await?;

        Ok(result
            .items
            .into_iter()
            .map(|f| BitableField {
                field_id: f.field_id,
                field_name: f.field_name,
                ui_type: f.ui_type,
            })
            .collect())
    }

    async fn bitable_records(
        &self,
        app: &BitableToken,
        table_id: &str,
        view_id: Option<&str>,
    ) -> Result<Vec<BitableRecord>, AppError> {
        let path = format!("bitable/v1/apps/{}/tables/{}/records/search", app, table_id);
        let body = match view_id {
            Some(view) => serde_json::json!({ "view_id": view }),
            None => serde_json::json!({}),
        };

        let result = fetch_all_pages(
            |page_size, cursor| {
                let query = page_query(page_size, cursor);
                let path = path.clone();
                let body = &body;
                async move {
                    let data = self.call(Method::POST, &path, &query, Some(body)).await?;
                    let page: PageData<RawBitableRecord> = parser::parse_data(data, &path)?;
                    Ok(into_paginated(page))
                }
            },
            BITABLE_PAGE_SIZE,
            Some(MAX_PAGES_PER_LISTING),
        )
        .await?;

        Ok(result
            .items
            .into_iter()
            .map(|r| BitableRecord {
                record_id: r.record_id,
                fields: r.fields,
            })
            .collect())
    }

    async fn user_name(&self, user_id: &str) -> Result<String, AppError> {
        let data: UserData = self
            .get_data(
                &format!("contact/v3/users/{}", user_id),
                &[("user_id_type", "open_id".to_string())],
            )
            .await?;
        let user = data.user;
        if user.name.is_empty() {
            Ok(user.en_name.unwrap_or_default())
        } else {
            Ok(user.name)
        }
    }
}

/// Result of an HTTP operation with response metadata.
#[derive(Debug)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: reqwest::StatusCode,
    pub url: String,
}

/// Extracts the response body as text with metadata.
pub async fn extract_response_text(response: Response) -> Result<ApiResponse<String>, AppError> {
    let status = response.status();
    let url = response.url().to_string();
    let text = response.text().await?;

    Ok(ApiResponse {
        data: text,
        status,
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, StaticToken, TokenManager, TokenRefresher};
    use axum::extract::State;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::Router;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn client(base: &str) -> FeishuHttpClient {
        let token = AccessToken::new("u-test").unwrap();
        FeishuHttpClient::new(
            base,
            Arc::new(StaticToken::new(token)),
            Duration::from_secs(5),
            CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_url_joins_open_apis_prefix() {
        let client = client("https://open.feishu.cn/");
        assert_eq!(
            client.endpoint_url("/docx/v1/documents/abc/blocks"),
            "https://open.feishu.cn/open-apis/docx/v1/documents/abc/blocks"
        );
    }

    #[test]
    fn test_page_query_includes_cursor_only_when_present() {
        assert_eq!(page_query(50, None), vec![("page_size", "50".to_string())]);
        assert_eq!(
            page_query(50, Some("c1".to_string())),
            vec![
                ("page_size", "50".to_string()),
                ("page_token", "c1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_client_sends_nothing() {
        let client = client("http://127.0.0.1:9");
        client.cancel.cancel();
        let result = client
            .list_blocks(&DocumentId::from_raw("doxcnTest"), None)
            .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    /// Serves scripted `(status, body)` responses in order and records the
    /// bearer token of every request.
    struct ScriptedServer {
        responses: Mutex<VecDeque<(u16, String)>>,
        tokens_seen: Mutex<Vec<String>>,
    }

    async fn respond(
        State(server): State<Arc<ScriptedServer>>,
        headers: HeaderMap,
    ) -> (StatusCode, String) {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .trim_start_matches("Bearer ")
            .to_string();
        server.tokens_seen.lock().push(bearer);
        let (status, body) = server
            .responses
            .lock()
            .pop_front()
            .unwrap_or((500, "unexpected request".to_string()));
        (StatusCode::from_u16(status).unwrap(), body)
    }

    async fn serve(responses: Vec<(u16, &str)>) -> (String, Arc<ScriptedServer>) {
        let server = Arc::new(ScriptedServer {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            ),
            tokens_seen: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(respond).with_state(server.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", address), server)
    }

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<Credential, AppError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential::issued_now(
                AccessToken::new(format!("u-new-{}", n)).unwrap(),
                Some(format!("ur-{}", n)),
                chrono::Duration::hours(2),
            ))
        }
    }

    fn refreshing_client(base: &str) -> (FeishuHttpClient, Arc<CountingRefresher>) {
        let refresher = Arc::new(CountingRefresher::default());
        let manager = TokenManager::new(
            Credential::issued_now(
                AccessToken::new("u-old").unwrap(),
                Some("ur-0".to_string()),
                chrono::Duration::hours(2),
            ),
            refresher.clone(),
        );
        let client = FeishuHttpClient::new(
            base,
            Arc::new(manager),
            Duration::from_secs(5),
            CancelToken::new(),
        )
        .unwrap();
        (client, refresher)
    }

    const TOKEN_INVALID: &str = r#"{"code":99991677,"msg":"Authentication token expired."}"#;
    const EMPTY_PAGE: &str = r#"{"code":0,"msg":"success","data":{"items":[],"has_more":false}}"#;

    #[tokio::test]
    async fn test_rejected_token_is_refreshed_and_request_replayed() {
        let (base, server) = serve(vec![(400, TOKEN_INVALID), (200, EMPTY_PAGE)]).await;
        let (client, refresher) = refreshing_client(&base);

        let page = client
            .list_blocks(&DocumentId::from_raw("doxcnTest"), None)
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*server.tokens_seen.lock(), vec!["u-old", "u-new-1"]);
    }

    #[tokio::test]
    async fn test_second_rejection_is_an_auth_error() {
        let (base, server) = serve(vec![(400, TOKEN_INVALID), (400, TOKEN_INVALID)]).await;
        let (client, refresher) = refreshing_client(&base);

        let result = client
            .list_blocks(&DocumentId::from_raw("doxcnTest"), None)
            .await;

        assert!(matches!(result, Err(AppError::Auth { .. })));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.tokens_seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_download_is_replayed_after_token_refresh() {
        let (base, server) = serve(vec![(401, TOKEN_INVALID), (200, "PNGDATA")]).await;
        let (client, refresher) = refreshing_client(&base);

        let stream = client
            .download_media(&MediaReference::new(MediaKind::Image, "boxcnImg"))
            .await
            .unwrap();
        let chunks: Vec<Vec<u8>> = stream.map(|chunk| chunk.unwrap()).collect().await;

        assert_eq!(chunks.concat(), b"PNGDATA".to_vec());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*server.tokens_seen.lock(), vec!["u-old", "u-new-1"]);
    }

    #[tokio::test]
    async fn test_download_second_rejection_is_an_auth_error() {
        let (base, server) = serve(vec![(401, TOKEN_INVALID), (401, TOKEN_INVALID)]).await;
        let (client, refresher) = refreshing_client(&base);

        let result = client
            .download_media(&MediaReference::new(MediaKind::Image, "boxcnImg"))
            .await;

        assert!(matches!(result, Err(AppError::Auth { .. })));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.tokens_seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_boards_have_no_temporary_link() {
        let client = client("http://127.0.0.1:9");
        let board = MediaReference::new(MediaKind::Board, "bd1234");
        assert!(matches!(
            client.temporary_download_url(&board).await,
            Err(AppError::MediaUnavailable { .. })
        ));
    }
}
