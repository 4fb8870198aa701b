// src/formatting/prefetch.rs
//! Concurrent collection of everything a render pass needs from the network.
//!
//! The tree is scanned once for media tokens, user mentions and embedded
//! tables; each unique item is fetched at most once, up to `concurrency`
//! at a time. Recoverable failures are stored as messages in
//! [`Resolutions`]; only fatal errors abort.

use super::rich_text::mentioned_users;
use super::tables::values::{tabular_from_bitable, tabular_from_sheet};
use super::{bitable_key, sheet_key, Resolutions};
use crate::api::FeishuRepository;
use crate::cancel::CancelToken;
use crate::error::AppError;
use crate::error_recovery::{retry_with_backoff, RetryPolicy};
use crate::media::{MediaResolver, ResolvedAsset};
use crate::model::{
    BlockContent, DocumentTree, EmbeddedBitable, EmbeddedSheet, MediaReference, TabularData,
};
use crate::types::{BitableToken, SpreadsheetToken};
use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// Collaborators for one prefetch.
#[derive(Clone)]
pub struct PrefetchContext {
    pub repository: Arc<dyn FeishuRepository>,
    pub media: Arc<MediaResolver>,
    pub retry: RetryPolicy,
    pub cancel: CancelToken,
    pub concurrency: usize,
    /// Fetch embedded sheets and bitables for inlining.
    pub inline_embedded: bool,
}

enum Job {
    Media(MediaReference),
    User(String),
    Sheet(EmbeddedSheet),
    Bitable(EmbeddedBitable),
}

enum Outcome {
    Media(String, Result<ResolvedAsset, String>),
    User(String, Option<String>),
    Sheet(String, Result<TabularData, String>),
    Bitable(String, Result<TabularData, String>),
}

/// Resolves every media reference, mention and embedded table in `tree`.
pub async fn prefetch(
    tree: &DocumentTree,
    ctx: &PrefetchContext,
) -> Result<Resolutions, AppError> {
    let jobs = collect_jobs(tree, ctx.inline_embedded);
    log::debug!("Prefetching {} items with concurrency {}", jobs.len(), ctx.concurrency);

    let mut outcomes = stream::iter(jobs)
        .map(|job| run_job(job, ctx))
        .buffer_unordered(ctx.concurrency.max(1));

    let mut resolutions = Resolutions::default();
    while let Some(outcome) = outcomes.next().await {
        match outcome? {
            Outcome::Media(token, result) => {
                resolutions.media.insert(token, result);
            }
            Outcome::User(id, Some(name)) => {
                resolutions.users.insert(id, name);
            }
            Outcome::User(_, None) => {}
            Outcome::Sheet(key, result) => {
                resolutions.sheets.insert(key, result);
            }
            Outcome::Bitable(key, result) => {
                resolutions.bitables.insert(key, result);
            }
        }
    }

    Ok(resolutions)
}

fn collect_jobs(tree: &DocumentTree, inline_embedded: bool) -> Vec<Job> {
    let mut media: IndexMap<String, MediaReference> = IndexMap::new();
    let mut users: IndexSet<String> = IndexSet::new();
    let mut sheets: IndexMap<String, EmbeddedSheet> = IndexMap::new();
    let mut bitables: IndexMap<String, EmbeddedBitable> = IndexMap::new();

    for node in tree.nodes() {
        let content = &node.block.content;
        if let Some(reference) = content.media() {
            media
                .entry(reference.token.clone())
                .or_insert_with(|| reference.clone());
        }
        if let Some(text) = content.text() {
            users.extend(mentioned_users(text).map(str::to_string));
        }
        match content {
            BlockContent::Sheet(sheet) if inline_embedded => {
                sheets
                    .entry(sheet_key(&sheet.token, &sheet.sheet_id))
                    .or_insert_with(|| sheet.clone());
            }
            BlockContent::Bitable(bitable) if inline_embedded => {
                bitables
                    .entry(bitable_key(
                        &bitable.app_token,
                        &bitable.table_id,
                        bitable.view_id.as_deref(),
                    ))
                    .or_insert_with(|| bitable.clone());
            }
            _ => {}
        }
    }

    media
        .into_values()
        .map(Job::Media)
        .chain(users.into_iter().map(Job::User))
        .chain(sheets.into_values().map(Job::Sheet))
        .chain(bitables.into_values().map(Job::Bitable))
        .collect()
}

async fn run_job(job: Job, ctx: &PrefetchContext) -> Result<Outcome, AppError> {
    ctx.cancel.check()?;

    match job {
        Job::Media(reference) => {
            let result = recoverable(ctx.media.resolve(&reference).await)?;
            Ok(Outcome::Media(reference.token, result))
        }
        Job::User(id) => {
            let name = retry_with_backoff(|| ctx.repository.user_name(&id), ctx.retry).await;
            let name = match recoverable(name)? {
                Ok(name) => Some(name),
                Err(reason) => {
                    log::debug!("Mention {} left unresolved: {}", id, reason);
                    None
                }
            };
            Ok(Outcome::User(id, name))
        }
        Job::Sheet(sheet) => {
            let token = SpreadsheetToken::from_raw(sheet.token.clone());
            let table =
                fetch_sheet_table(ctx.repository.as_ref(), &token, &sheet.sheet_id, "", ctx.retry)
                    .await;
            Ok(Outcome::Sheet(
                sheet_key(&sheet.token, &sheet.sheet_id),
                recoverable(table)?,
            ))
        }
        Job::Bitable(bitable) => {
            let app = BitableToken::from_raw(bitable.app_token.clone());
            let table = fetch_bitable_table(
                ctx.repository.as_ref(),
                &app,
                &bitable.table_id,
                bitable.view_id.as_deref(),
                "",
                ctx.retry,
            )
            .await;
            Ok(Outcome::Bitable(
                bitable_key(
                    &bitable.app_token,
                    &bitable.table_id,
                    bitable.view_id.as_deref(),
                ),
                recoverable(table)?,
            ))
        }
    }
}

/// Splits a result into a fatal error or a stored outcome.
fn recoverable<T>(result: Result<T, AppError>) -> Result<Result<T, String>, AppError> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => Ok(Err(e.to_string())),
    }
}

/// Fetches one worksheet as a table titled `title`.
pub async fn fetch_sheet_table(
    repository: &dyn FeishuRepository,
    token: &SpreadsheetToken,
    sheet_id: &str,
    title: &str,
    retry: RetryPolicy,
) -> Result<TabularData, AppError> {
    let values = retry_with_backoff(|| repository.sheet_values(token, sheet_id), retry)
        .await
        .map_err(|e| e.into_permission(format!("sheet {}/{}", token, sheet_id)))?;
    Ok(tabular_from_sheet(title, values))
}

/// Fetches one bitable table, optionally filtered by a view, as a table
/// titled `title`.
pub async fn fetch_bitable_table(
    repository: &dyn FeishuRepository,
    app: &BitableToken,
    table_id: &str,
    view_id: Option<&str>,
    title: &str,
    retry: RetryPolicy,
) -> Result<TabularData, AppError> {
    let resource = || format!("bitable {}/{}", app, table_id);
    let fields = retry_with_backoff(|| repository.bitable_fields(app, table_id, view_id), retry)
        .await
        .map_err(|e| e.into_permission(resource()))?;
    let records = retry_with_backoff(|| repository.bitable_records(app, table_id, view_id), retry)
        .await
        .map_err(|e| e.into_permission(resource()))?;
    Ok(tabular_from_bitable(title, &fields, &records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryRepository;
    use crate::media::MediaPolicy;
    use crate::model::{
        BitableField, BitableRecord, BitableTable, Block, MediaKind, SheetInfo, SpreadsheetInfo,
        TextElement, TextPayload,
    };
    use serde_json::json;

    fn context(repository: Arc<InMemoryRepository>) -> PrefetchContext {
        let repository: Arc<dyn FeishuRepository> = repository;
        PrefetchContext {
            media: Arc::new(
                MediaResolver::new(repository.clone(), MediaPolicy::LinkOnly)
                    .with_retry(RetryPolicy::immediate(1)),
            ),
            repository,
            retry: RetryPolicy::immediate(1),
            cancel: CancelToken::new(),
            concurrency: 4,
            inline_embedded: true,
        }
    }

    fn tree() -> DocumentTree {
        DocumentTree::build(vec![
            Block::new("root", BlockContent::Page(TextPayload::plain("T")))
                .with_children(["i1", "i2", "m", "s", "b"]),
            Block::new("i1", BlockContent::Image(MediaReference::new(MediaKind::Image, "img")))
                .with_parent("root"),
            Block::new("i2", BlockContent::Image(MediaReference::new(MediaKind::Image, "img")))
                .with_parent("root"),
            Block::new(
                "m",
                BlockContent::Text(TextPayload::new(vec![
                    TextElement::MentionUser {
                        user_id: "ou_1".to_string(),
                    },
                    TextElement::MentionUser {
                        user_id: "ou_2".to_string(),
                    },
                ])),
            )
            .with_parent("root"),
            Block::new(
                "s",
                BlockContent::Sheet(EmbeddedSheet {
                    token: "shtcn".to_string(),
                    sheet_id: "s1".to_string(),
                }),
            )
            .with_parent("root"),
            Block::new(
                "b",
                BlockContent::Bitable(EmbeddedBitable {
                    app_token: "bascn".to_string(),
                    table_id: "tbl1".to_string(),
                    view_id: None,
                }),
            )
            .with_parent("root"),
        ])
        .unwrap()
    }

    fn repository() -> InMemoryRepository {
        InMemoryRepository::new()
            .with_media("img", b"\x89PNG".to_vec())
            .with_user("ou_1", "Ada")
            .with_spreadsheet(
                "shtcn",
                SpreadsheetInfo {
                    title: "Budget".to_string(),
                    sheets: vec![SheetInfo {
                        sheet_id: "s1".to_string(),
                        title: "Q1".to_string(),
                    }],
                },
                vec![("s1", vec![vec![json!("k")], vec![json!("v")]])],
            )
    }

    #[tokio::test]
    async fn test_prefetch_collects_each_item_once() {
        let repository = Arc::new(repository());
        let resolutions = prefetch(&tree(), &context(repository.clone())).await.unwrap();

        assert_eq!(resolutions.media.len(), 1);
        assert!(resolutions.media["img"].is_ok());
        assert_eq!(repository.request_count("tmp_url:"), 1);

        assert_eq!(resolutions.users.get("ou_1").map(String::as_str), Some("Ada"));
        assert!(!resolutions.users.contains_key("ou_2"));

        let sheet = resolutions.sheets["shtcn/s1"].as_ref().unwrap();
        assert_eq!(sheet.header, vec!["k"]);
        assert!(resolutions.bitables["bascn/tbl1"].is_err());
    }

    #[tokio::test]
    async fn test_embedded_tables_skipped_when_not_inlined() {
        let repository = Arc::new(repository());
        let mut ctx = context(repository.clone());
        ctx.inline_embedded = false;

        let resolutions = prefetch(&tree(), &ctx).await.unwrap();
        assert!(resolutions.sheets.is_empty());
        assert!(resolutions.bitables.is_empty());
        assert_eq!(repository.request_count("sheet:"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_prefetch_fails() {
        let ctx = context(Arc::new(repository()));
        ctx.cancel.cancel();

        assert!(matches!(
            prefetch(&tree(), &ctx).await,
            Err(AppError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_each_bitable_view_is_fetched_separately() {
        let embed = |id: &str, view: &str| {
            Block::new(
                id,
                BlockContent::Bitable(EmbeddedBitable {
                    app_token: "bascn".to_string(),
                    table_id: "tbl1".to_string(),
                    view_id: Some(view.to_string()),
                }),
            )
            .with_parent("root")
        };
        let tree = DocumentTree::build(vec![
            Block::new("root", BlockContent::Page(TextPayload::plain("Views")))
                .with_children(["a", "b", "a2"]),
            embed("a", "vewOpen"),
            embed("b", "vewDone"),
            embed("a2", "vewOpen"),
        ])
        .unwrap();
        let repository = Arc::new(InMemoryRepository::new().with_bitable_table(
            "bascn",
            "Tracker",
            BitableTable {
                table_id: "tbl1".to_string(),
                name: "Tasks".to_string(),
            },
            Vec::new(),
            Vec::new(),
        ));

        let resolutions = prefetch(&tree, &context(repository.clone())).await.unwrap();

        let mut keys: Vec<_> = resolutions.bitables.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["bascn/tbl1?view=vewDone", "bascn/tbl1?view=vewOpen"]
        );
        assert_eq!(repository.request_count("bitable:bascn/tbl1/records"), 2);
    }

    #[tokio::test]
    async fn test_bitable_table_follows_field_order() {
        let repository = InMemoryRepository::new().with_bitable_table(
            "bascn",
            "Tracker",
            BitableTable {
                table_id: "tbl1".to_string(),
                name: "Tasks".to_string(),
            },
            vec![BitableField {
                field_id: "f1".to_string(),
                field_name: "Name".to_string(),
                ui_type: "Text".to_string(),
            }],
            vec![BitableRecord {
                record_id: "r1".to_string(),
                fields: json!({ "Name": "Launch" }).as_object().cloned().unwrap(),
            }],
        );

        let table = fetch_bitable_table(
            &repository,
            &BitableToken::from_raw("bascn"),
            "tbl1",
            None,
            "Tasks",
            RetryPolicy::immediate(1),
        )
        .await
        .unwrap();
        assert_eq!(table.title, "Tasks");
        assert_eq!(table.rows, vec![vec!["Launch".to_string()]]);
    }
}
