// src/export.rs
//! Export driver: turns one classified resource into Markdown.
//!
//! An [`Exporter`] lives for one export. Its media resolver caches per
//! token, so an asset referenced from several documents of a wiki is
//! resolved once.

use crate::api::{BlockFetcher, FeishuRepository, ThrottledRepository};
use crate::cancel::CancelToken;
use crate::constants::{MAX_DEFAULT_CONCURRENCY, MAX_HEADING_LEVEL};
use crate::error::AppError;
use crate::error_recovery::{retry_with_backoff, RetryPolicy};
use crate::formatting::prefetch::{fetch_bitable_table, fetch_sheet_table};
use crate::formatting::tables::{render_grid, values::tabular_grid};
use crate::formatting::{prefetch, render_document, PrefetchContext, RenderOptions};
use crate::media::{MediaPolicy, MediaResolver};
use crate::model::{DocumentTree, MediaKind, MediaReference, TabularData};
use crate::pipeline::ResourceExporter;
use crate::progress::{NoopObserver, ProgressEvent, ProgressObserver};
use crate::types::{
    BitableToken, BoardToken, DocumentId, RenderedMarkdown, ResourceRef, SpreadsheetToken,
    Warning, WarningKind,
};
use crate::wiki::WikiTraversal;
use std::path::PathBuf;
use std::sync::Arc;

/// Concurrency used when none is configured: one per core, at most 8.
pub fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, MAX_DEFAULT_CONCURRENCY)
}

/// Everything one export needs from its caller.
#[derive(Clone)]
pub struct ExportContext {
    pub repository: Arc<dyn FeishuRepository>,
    pub observer: Arc<dyn ProgressObserver>,
    pub cancel: CancelToken,
    pub render: RenderOptions,
    pub media_policy: MediaPolicy,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl ExportContext {
    pub fn new(repository: Arc<dyn FeishuRepository>) -> Self {
        Self {
            repository,
            observer: Arc::new(NoopObserver),
            cancel: CancelToken::new(),
            render: RenderOptions::default(),
            media_policy: MediaPolicy::default(),
            concurrency: default_concurrency(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_render_options(mut self, render: RenderOptions) -> Self {
        self.render = render;
        self
    }

    pub fn with_media_policy(mut self, policy: MediaPolicy) -> Self {
        self.media_policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// The result of one export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub title: String,
    pub markdown: RenderedMarkdown,
    pub warnings: Vec<Warning>,
    /// Files materialized under the export root, sorted.
    pub assets: Vec<PathBuf>,
}

/// A rendered piece of an export, before assembly.
#[derive(Debug, Clone, Default)]
pub(crate) struct Section {
    pub title: String,
    pub markdown: String,
    pub warnings: Vec<Warning>,
}

/// Exports resources under one [`ExportContext`].
pub struct Exporter {
    ctx: ExportContext,
    media: Arc<MediaResolver>,
    fetcher: BlockFetcher,
}

impl Exporter {
    pub fn new(mut ctx: ExportContext) -> Self {
        // Every remote call of this export shares one concurrency budget.
        ctx.repository = Arc::new(ThrottledRepository::new(
            ctx.repository.clone(),
            ctx.concurrency,
        ));
        let media = MediaResolver::new(ctx.repository.clone(), ctx.media_policy.clone())
            .with_retry(ctx.retry)
            .with_cancel(ctx.cancel.clone())
            .with_observer(ctx.observer.clone());
        let fetcher = BlockFetcher::new(ctx.repository.clone())
            .with_retry(ctx.retry)
            .with_cancel(ctx.cancel.clone())
            .with_observer(ctx.observer.clone());

        Self {
            ctx,
            media: Arc::new(media),
            fetcher,
        }
    }

    pub(crate) fn context(&self) -> &ExportContext {
        &self.ctx
    }

    /// Exports `resource` to a single Markdown payload.
    pub async fn export(&self, resource: &ResourceRef) -> Result<ExportOutcome, AppError> {
        log::info!("Exporting {}", resource);
        self.ctx.cancel.check()?;

        let section = match resource {
            ResourceRef::Document { document_id } => {
                self.document_section(document_id, self.ctx.render.include_title)
                    .await?
            }
            ResourceRef::Sheet { token, sheet_id } => {
                self.spreadsheet_section(token, sheet_id.as_deref(), Some(1))
                    .await?
            }
            ResourceRef::Bitable {
                app_token,
                table_id,
                view_id,
            } => {
                self.bitable_section(app_token, table_id.as_deref(), view_id.as_deref(), Some(1))
                    .await?
            }
            ResourceRef::WikiNode { node_token } => {
                WikiTraversal::new(self).export_space(node_token).await?
            }
            ResourceRef::Board { token } => self.board_section(token).await?,
        };

        let mut markdown = section.markdown.trim_end().to_string();
        markdown.push('\n');

        for warning in &section.warnings {
            log::warn!("{}", warning);
        }
        log::info!(
            "Exported '{}' ({} bytes, {} warnings)",
            section.title,
            markdown.len(),
            section.warnings.len()
        );

        Ok(ExportOutcome {
            title: section.title,
            markdown: RenderedMarkdown::new(markdown),
            warnings: section.warnings,
            assets: self.media.materialized_files(),
        })
    }

    /// Fetches, prefetches and renders one document.
    pub(crate) async fn document_section(
        &self,
        document: &DocumentId,
        include_title: bool,
    ) -> Result<Section, AppError> {
        let fetched = self.fetcher.fetch_all_blocks(document).await?;
        log::debug!(
            "Document {}: {} blocks in {} pages",
            document,
            fetched.blocks.len(),
            fetched.pages_fetched
        );

        let tree = DocumentTree::build(fetched.blocks)?;
        let resolutions = prefetch(&tree, &self.prefetch_context()).await?;

        let options = RenderOptions {
            include_title,
            ..self.ctx.render.clone()
        };
        let rendered = render_document(&tree, &resolutions, &options);

        self.ctx.observer.on_event(ProgressEvent::BlocksRendered {
            document_id: document.to_string(),
            blocks: tree.len(),
        });

        let mut warnings = fetched.warnings;
        warnings.extend(rendered.warnings);

        Ok(Section {
            title: tree.title(),
            markdown: rendered.markdown,
            warnings,
        })
    }

    /// A spreadsheet as one section per worksheet, or only `only_sheet`.
    ///
    /// With `title_level`, the spreadsheet title leads at that level and
    /// worksheets follow one level deeper; without it, worksheets start at
    /// level 2.
    pub(crate) async fn spreadsheet_section(
        &self,
        token: &SpreadsheetToken,
        only_sheet: Option<&str>,
        title_level: Option<usize>,
    ) -> Result<Section, AppError> {
        let repository = self.ctx.repository.as_ref();
        let info = retry_with_backoff(|| repository.spreadsheet_info(token), self.ctx.retry)
            .await
            .map_err(|e| e.into_permission(format!("spreadsheet {}", token)))?;

        let sheets: Vec<_> = info
            .sheets
            .iter()
            .filter(|sheet| only_sheet.map_or(true, |id| sheet.sheet_id == id))
            .collect();
        if let (Some(id), true) = (only_sheet, sheets.is_empty()) {
            return Err(AppError::UnrecognizedResource(format!(
                "sheet {} not found in spreadsheet {}",
                id, token
            )));
        }

        let mut tables = Vec::with_capacity(sheets.len());
        let mut warnings = Vec::new();
        for sheet in sheets {
            self.ctx.cancel.check()?;
            let table =
                fetch_sheet_table(repository, token, &sheet.sheet_id, &sheet.title, self.ctx.retry)
                    .await;
            tables.push(self.confine(table, &sheet.title, &mut warnings)?);
        }

        Ok(Section {
            markdown: self.tabular_markdown(&info.title, title_level, &tables),
            title: info.title,
            warnings,
        })
    }

    /// A bitable as one section per table, or only `only_table`.
    pub(crate) async fn bitable_section(
        &self,
        app: &BitableToken,
        only_table: Option<&str>,
        view_id: Option<&str>,
        title_level: Option<usize>,
    ) -> Result<Section, AppError> {
        let repository = self.ctx.repository.as_ref();
        let name = retry_with_backoff(|| repository.bitable_name(app), self.ctx.retry)
            .await
            .map_err(|e| e.into_permission(format!("bitable {}", app)))?;
        let tables = retry_with_backoff(|| repository.bitable_tables(app), self.ctx.retry)
            .await
            .map_err(|e| e.into_permission(format!("bitable {}", app)))?;

        let selected: Vec<_> = tables
            .iter()
            .filter(|table| only_table.map_or(true, |id| table.table_id == id))
            .collect();
        if let (Some(id), true) = (only_table, selected.is_empty()) {
            return Err(AppError::UnrecognizedResource(format!(
                "table {} not found in bitable {}",
                id, app
            )));
        }

        let mut data = Vec::with_capacity(selected.len());
        let mut warnings = Vec::new();
        for table in selected {
            self.ctx.cancel.check()?;
            let view = only_table.and(view_id);
            let fetched = fetch_bitable_table(
                repository,
                app,
                &table.table_id,
                view,
                &table.name,
                self.ctx.retry,
            )
            .await;
            data.push(self.confine(fetched, &table.name, &mut warnings)?);
        }

        Ok(Section {
            markdown: self.tabular_markdown(&name, title_level, &data),
            title: name,
            warnings,
        })
    }

    /// A whiteboard as its snapshot image.
    pub(crate) async fn board_section(&self, token: &BoardToken) -> Result<Section, AppError> {
        let reference = MediaReference::new(MediaKind::Board, token.as_str());
        let mut warnings = Vec::new();

        let markdown = match self.media.resolve(&reference).await {
            Ok(asset) => match asset.href() {
                Some(href) => format!("![whiteboard]({})", href),
                None => format!("[whiteboard: {}]", token),
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warnings.push(
                    Warning::new(WarningKind::MediaUnavailable, e.to_string())
                        .with_context(token.to_string()),
                );
                "[whiteboard unavailable]".to_string()
            }
        };

        Ok(Section {
            title: token.to_string(),
            markdown,
            warnings,
        })
    }

    fn prefetch_context(&self) -> PrefetchContext {
        PrefetchContext {
            repository: self.ctx.repository.clone(),
            media: self.media.clone(),
            retry: self.ctx.retry,
            cancel: self.ctx.cancel.clone(),
            concurrency: self.ctx.concurrency,
            inline_embedded: self.ctx.render.inline_embedded,
        }
    }

    /// Keeps a failed table as an empty placeholder unless the failure is
    /// fatal.
    fn confine(
        &self,
        table: Result<TabularData, AppError>,
        title: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<TabularData, AppError> {
        match table {
            Ok(table) => Ok(table),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log::warn!("Table '{}' unavailable: {}", title, e);
                warnings.push(
                    Warning::new(WarningKind::EmbeddedUnavailable, e.to_string())
                        .with_context(title.to_string()),
                );
                Ok(TabularData {
                    title: title.to_string(),
                    ..Default::default()
                })
            }
        }
    }

    fn tabular_markdown(
        &self,
        title: &str,
        title_level: Option<usize>,
        tables: &[TabularData],
    ) -> String {
        let mut parts = Vec::with_capacity(tables.len() + 1);
        let section_level = match title_level {
            Some(level) => {
                parts.push(heading(level, title));
                level + 1
            }
            None => 2,
        };

        for table in tables {
            parts.push(format!(
                "{}\n\n{}",
                heading(section_level, &table.title),
                render_grid(&tabular_grid(table), self.ctx.render.table_format)
            ));
        }
        parts.join("\n\n")
    }
}

#[async_trait::async_trait]
impl ResourceExporter for Exporter {
    async fn export(&self, resource: &ResourceRef) -> Result<ExportOutcome, AppError> {
        Exporter::export(self, resource).await
    }
}

/// A Markdown heading, clamped to the deepest level.
pub(crate) fn heading(level: usize, title: &str) -> String {
    format!("{} {}", "#".repeat(level.clamp(1, MAX_HEADING_LEVEL)), title.trim())
}
