// src/formatting/mod.rs
//! Renders document trees and tabular data into Markdown.
//!
//! Rendering is split in two: [`prefetch`] gathers everything that needs the
//! network (media links, user names, embedded tables) concurrently, then
//! [`render_document`] walks the tree synchronously over those results.

// Sub-modules
pub mod block_renderer;
pub mod code_language;
pub mod prefetch;
pub mod rich_text;
mod state;
pub mod tables;

pub use self::block_renderer::{render_document, MarkdownBlockRenderer, RenderedDocument};
pub use self::prefetch::{prefetch, PrefetchContext};
pub use self::state::FormatContext;
pub use self::tables::TableFormat;

use crate::media::ResolvedAsset;
use crate::model::TabularData;
use std::collections::HashMap;

/// Knobs for one rendering pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub table_format: TableFormat,
    /// Render embedded sheets and bitables as tables after their marker.
    pub inline_embedded: bool,
    /// Wrap each block in `<!-- block:ID -->` comments.
    pub with_block_ids: bool,
    /// Start with the document title as a level-1 heading.
    pub include_title: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            table_format: TableFormat::default(),
            inline_embedded: true,
            with_block_ids: false,
            include_title: true,
        }
    }
}

/// Everything rendering needs from outside the tree.
///
/// Failures are kept as messages; the renderer turns them into
/// placeholders and warnings.
#[derive(Debug, Clone, Default)]
pub struct Resolutions {
    /// By media token.
    pub media: HashMap<String, Result<ResolvedAsset, String>>,
    /// User id to display name.
    pub users: HashMap<String, String>,
    /// By `token/sheet_id`.
    pub sheets: HashMap<String, Result<TabularData, String>>,
    /// By `app_token/table_id`, plus `?view=` when a view is named.
    pub bitables: HashMap<String, Result<TabularData, String>>,
}

/// Key under which an embedded worksheet is resolved.
pub fn sheet_key(token: &str, sheet_id: &str) -> String {
    format!("{}/{}", token, sheet_id)
}

/// Key under which an embedded bitable table is resolved. Views of one
/// table filter differently, so each gets its own key.
pub fn bitable_key(app_token: &str, table_id: &str, view_id: Option<&str>) -> String {
    match view_id {
        Some(view) => format!("{}/{}?view={}", app_token, table_id, view),
        None => format!("{}/{}", app_token, table_id),
    }
}
