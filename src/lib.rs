// src/lib.rs
//! feishu2md library: exports Feishu/Lark documents, spreadsheets, bitables,
//! whiteboards and whole wiki trees as Markdown.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Export** — `Exporter`, `ExportContext`, `ExportOutcome`
//! - **Error handling** — `AppError`, `StructuralError`, `ValidationError`
//! - **Configuration** — `CommandLineInput`, `ExportConfig`
//! - **Domain model** — `Block`, `DocumentTree`, `WikiNode`, tabular data
//! - **Domain types** — typed tokens, `ResourceRef`, `Warning`
//! - **API client** — `FeishuRepository`, `FeishuHttpClient`, `InMemoryRepository`
//! - **Credentials** — `TokenSource`, `TokenManager`, `StaticToken`
//! - **Formatting** — `render_document`, `prefetch`, `RenderOptions`

pub mod api;
pub mod auth;
pub mod cancel;
pub mod config;
pub mod constants;
pub mod error;
pub mod error_recovery;
pub mod export;
pub mod formatting;
pub mod media;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod types;
pub mod wiki;

// --- Export ---
pub use crate::export::{default_concurrency, ExportContext, ExportOutcome, Exporter};

// --- Error Handling ---
pub use crate::error::{AppError, FeishuErrorCode, StructuralError};
pub use crate::error_recovery::{retry_with_backoff, RetryPolicy};
pub use crate::types::ValidationError;

// --- Configuration ---
pub use crate::config::{CommandLineInput, CredentialConfig, ExportConfig, MediaMode};

// --- Domain Model ---
pub use crate::model::{
    Block, BlockContent, BlockTag, DocumentTree, MediaKind, MediaReference, TabularData,
    TextPayload, WikiNode, WikiObjType,
};

// --- Domain Types ---
pub use crate::types::{
    AccessToken, BitableToken, BlockId, BoardToken, DocumentId, RenderedMarkdown, ResourceRef,
    SpreadsheetToken, Warning, WarningKind, WikiNodeToken,
};

// --- API Client ---
pub use crate::api::{BlockFetcher, FeishuHttpClient, FeishuRepository, InMemoryRepository};

// --- Credentials ---
pub use crate::auth::{
    Credential, HttpTokenRefresher, StaticToken, TokenManager, TokenRefresher, TokenSource,
};

// --- Media ---
pub use crate::media::{MediaPolicy, MediaResolver, ResolvedAsset};

// --- Formatting ---
pub use crate::formatting::{prefetch, render_document, RenderOptions, Resolutions, TableFormat};

// --- Pipeline Traits ---
pub use crate::cancel::CancelToken;
pub use crate::pipeline::{plan_delivery, MarkdownDelivery, ResourceExporter};
pub use crate::progress::{ChannelObserver, NoopObserver, ProgressEvent, ProgressObserver};
