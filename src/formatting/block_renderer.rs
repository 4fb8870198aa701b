// src/formatting/block_renderer.rs
//! Block rendering engine: converts a document tree to Markdown.
//!
//! Each block renders its own line(s) through a dispatch table keyed by
//! block tag; the walk then composes children around that output (list
//! indentation, quote prefixes, blank-line separation). Rendering only
//! reads the tree and the prefetched [`Resolutions`], so it is pure and
//! deterministic.

use super::code_language::fence_language;
use super::rich_text::render_text;
use super::state::FormatContext;
use super::tables::{self, values::tabular_grid};
use super::{bitable_key, sheet_key, RenderOptions, Resolutions};
use crate::constants::{
    CHARS_PER_BLOCK_ESTIMATE, DEFAULT_CALLOUT_EMOJI, LIST_INDENT, MAX_HEADING_LEVEL,
};
use crate::model::{
    BlockContent, BlockTag, ChildSlot, DocumentTree, MediaKind, MediaReference, OrderedSequence,
    TabularData, TextPayload, TreeNode,
};
use crate::types::{BlockId, Warning, WarningKind};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Markdown for one document plus everything that went wrong on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub markdown: String,
    pub warnings: Vec<Warning>,
}

/// Renders a block's own output, excluding its children.
type RenderFn =
    fn(&MarkdownBlockRenderer<'_>, &TreeNode, &FormatContext, &mut Vec<Warning>) -> String;

static DISPATCH: Lazy<HashMap<BlockTag, RenderFn>> = Lazy::new(|| {
    let mut table: HashMap<BlockTag, RenderFn> = HashMap::new();
    table.insert(BlockTag::Page, render_page as RenderFn);
    table.insert(BlockTag::Text, render_paragraph as RenderFn);
    table.insert(BlockTag::Heading, render_heading as RenderFn);
    table.insert(BlockTag::Bullet, render_bullet as RenderFn);
    table.insert(BlockTag::Ordered, render_ordered as RenderFn);
    table.insert(BlockTag::Todo, render_todo as RenderFn);
    table.insert(BlockTag::Code, render_code as RenderFn);
    table.insert(BlockTag::Quote, render_quote as RenderFn);
    table.insert(BlockTag::QuoteContainer, render_nothing as RenderFn);
    table.insert(BlockTag::Callout, render_callout as RenderFn);
    table.insert(BlockTag::Divider, render_divider as RenderFn);
    table.insert(BlockTag::Image, render_media as RenderFn);
    table.insert(BlockTag::File, render_media as RenderFn);
    table.insert(BlockTag::Board, render_media as RenderFn);
    table.insert(BlockTag::Sheet, render_sheet as RenderFn);
    table.insert(BlockTag::Bitable, render_bitable as RenderFn);
    table.insert(BlockTag::Table, render_table as RenderFn);
    table.insert(BlockTag::TableCell, render_nothing as RenderFn);
    table.insert(BlockTag::Grid, render_nothing as RenderFn);
    table.insert(BlockTag::GridColumn, render_nothing as RenderFn);
    table.insert(BlockTag::View, render_nothing as RenderFn);
    table.insert(BlockTag::Unknown, render_unknown as RenderFn);
    table
});

static CALLOUT_EMOJI: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("bulb", "💡"),
        ("warning", "⚠️"),
        ("pushpin", "📌"),
        ("memo", "📝"),
        ("star", "⭐"),
        ("fire", "🔥"),
        ("white_check_mark", "✅"),
        ("x", "❌"),
        ("heart", "❤️"),
        ("rocket", "🚀"),
        ("information_source", "ℹ️"),
        ("question", "❓"),
        ("exclamation", "❗"),
        ("tada", "🎉"),
    ]
    .into_iter()
    .collect()
});

// --- Public API ---

/// Renders `tree` to Markdown using the prefetched `resolutions`.
pub fn render_document(
    tree: &DocumentTree,
    resolutions: &Resolutions,
    options: &RenderOptions,
) -> RenderedDocument {
    MarkdownBlockRenderer::new(tree, resolutions, options).render()
}

/// Formats one document tree as Markdown.
pub struct MarkdownBlockRenderer<'a> {
    tree: &'a DocumentTree,
    resolutions: &'a Resolutions,
    options: &'a RenderOptions,
}

impl<'a> MarkdownBlockRenderer<'a> {
    pub fn new(
        tree: &'a DocumentTree,
        resolutions: &'a Resolutions,
        options: &'a RenderOptions,
    ) -> Self {
        Self {
            tree,
            resolutions,
            options,
        }
    }

    pub fn render(&self) -> RenderedDocument {
        let mut warnings = Vec::new();
        let body = self.render_node(self.tree.root(), &FormatContext::new(), &mut warnings);

        let mut markdown = String::with_capacity(self.tree.len() * CHARS_PER_BLOCK_ESTIMATE);
        markdown.push_str(body.trim_start_matches('\n').trim_end());
        markdown.push('\n');

        log::debug!(
            "Rendered {} blocks into {} bytes with {} warnings",
            self.tree.len(),
            markdown.len(),
            warnings.len()
        );

        RenderedDocument { markdown, warnings }
    }

    /// Renders a node and everything below it.
    fn render_node(&self, index: usize, ctx: &FormatContext, warnings: &mut Vec<Warning>) -> String {
        let node = self.tree.node(index);
        let tag = node.block.tag();

        let own = DISPATCH
            .get(&tag)
            .map(|render| render(self, node, ctx, warnings))
            .unwrap_or_default();
        let own = self.annotate(node, own, ctx);

        // Table cells are rendered by the table itself.
        if tag == BlockTag::Table {
            return own;
        }

        let child_ctx = if tag.is_list_item() {
            ctx.enter_list()
        } else if tag.quotes_children() {
            ctx.enter_quote()
        } else if tag == BlockTag::TableCell {
            ctx.enter_table_cell()
        } else {
            ctx.enter_children()
        };
        let children = join_parts(self.render_children(node, &child_ctx, warnings));

        self.compose(tag, own, children)
    }

    /// Renders a node's children in tree order, numbering ordered runs.
    ///
    /// Returns each non-empty rendering with whether it came from a list
    /// item.
    fn render_children(
        &self,
        node: &TreeNode,
        ctx: &FormatContext,
        warnings: &mut Vec<Warning>,
    ) -> Vec<(bool, String)> {
        let mut parts = Vec::with_capacity(node.children.len());
        let mut previous_ordinal: Option<u32> = None;

        for slot in &node.children {
            match slot {
                ChildSlot::Present(index) => {
                    let child = self.tree.node(*index);
                    let child_ctx = match &child.block.content {
                        BlockContent::Ordered { sequence, .. } => {
                            let n = match sequence {
                                OrderedSequence::Explicit(n) => *n,
                                OrderedSequence::Auto => previous_ordinal.map_or(1, |p| p + 1),
                            };
                            previous_ordinal = Some(n);
                            ctx.with_ordinal(n)
                        }
                        _ => {
                            previous_ordinal = None;
                            ctx.clone()
                        }
                    };

                    let text = self.render_node(*index, &child_ctx, warnings);
                    if !text.is_empty() {
                        parts.push((child.block.tag().is_list_item(), text));
                    }
                }
                ChildSlot::Missing(id) => {
                    previous_ordinal = None;
                    warnings.push(inaccessible(id, &node.block.id));
                    parts.push((false, "[inaccessible block]".to_string()));
                }
            }
        }

        parts
    }

    fn compose(&self, tag: BlockTag, own: String, children: String) -> String {
        if children.is_empty() {
            return own;
        }
        if own.is_empty() && !tag.quotes_children() {
            return children;
        }

        let composed = match tag {
            BlockTag::Bullet | BlockTag::Ordered | BlockTag::Todo => {
                format!("{}\n{}", own, indent_lines(&children))
            }
            BlockTag::Callout if !self.options.with_block_ids => {
                let quoted = quote_lines(&children);
                match quoted.strip_prefix("> ") {
                    Some(first) => format!("{} {}", own, first),
                    None => format!("{}\n{}", own, quoted),
                }
            }
            BlockTag::Quote | BlockTag::QuoteContainer | BlockTag::Callout => {
                if own.is_empty() {
                    quote_lines(&children)
                } else {
                    format!("{}\n{}", own, quote_lines(&children))
                }
            }
            _ => format!("{}\n\n{}", own, children),
        };

        composed.trim_end().to_string()
    }

    fn annotate(&self, node: &TreeNode, own: String, ctx: &FormatContext) -> String {
        if !self.options.with_block_ids
            || own.is_empty()
            || ctx.in_table_cell()
            || node.block.tag() == BlockTag::Page
        {
            return own;
        }
        format!("<!-- block:{} -->\n{}\n<!-- /block -->", node.block.id, own)
    }

    fn text(&self, payload: &TextPayload, warnings: &mut Vec<Warning>) -> String {
        render_text(payload, &self.resolutions.users, warnings)
    }

    /// Inline content of a table cell; block children join with line breaks.
    fn render_cell(&self, id: &BlockId, ctx: &FormatContext, warnings: &mut Vec<Warning>) -> String {
        match self.tree.get(id) {
            Some(cell) => self
                .render_children(cell, ctx, warnings)
                .into_iter()
                .map(|(_, text)| text)
                .collect::<Vec<_>>()
                .join("\n"),
            None => {
                warnings.push(
                    Warning::new(WarningKind::InaccessibleBlock, "table cell was not fetched")
                        .with_context(id.to_string()),
                );
                "[inaccessible block]".to_string()
            }
        }
    }

    fn render_tabular(&self, data: &TabularData) -> String {
        tables::render_grid(&tabular_grid(data), self.options.table_format)
    }
}

// --- Per-tag renderers ---

fn render_nothing(
    _: &MarkdownBlockRenderer<'_>,
    _: &TreeNode,
    _: &FormatContext,
    _: &mut Vec<Warning>,
) -> String {
    String::new()
}

fn render_page(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    _: &mut Vec<Warning>,
) -> String {
    if !r.options.include_title || node.parent.is_some() {
        return String::new();
    }
    let title = node
        .block
        .content
        .text()
        .map(|t| t.plain_text().trim().to_string())
        .unwrap_or_default();
    if title.is_empty() {
        String::new()
    } else {
        format!("# {}", title)
    }
}

fn render_paragraph(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    node.block
        .content
        .text()
        .map(|t| r.text(t, warnings))
        .unwrap_or_default()
}

fn render_heading(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let BlockContent::Heading { level, text } = &node.block.content else {
        return String::new();
    };
    let text = r.text(text, warnings);
    if text.trim().is_empty() {
        return String::new();
    }
    let level = (*level as usize).clamp(1, MAX_HEADING_LEVEL);
    format!("{} {}", "#".repeat(level), text.trim())
}

fn render_bullet(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    ctx: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    format!("- {}", render_paragraph(r, node, ctx, warnings))
        .trim_end()
        .to_string()
}

fn render_ordered(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    ctx: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let n = ctx.ordinal().unwrap_or(1);
    format!("{}. {}", n, render_paragraph(r, node, ctx, warnings))
        .trim_end()
        .to_string()
}

fn render_todo(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let BlockContent::Todo { text, done } = &node.block.content else {
        return String::new();
    };
    let mark = if *done { "x" } else { " " };
    format!("- [{}] {}", mark, r.text(text, warnings))
        .trim_end()
        .to_string()
}

fn render_code(
    _: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    _: &mut Vec<Warning>,
) -> String {
    let BlockContent::Code { text, language } = &node.block.content else {
        return String::new();
    };
    let code = text.plain_text();
    format!(
        "```{}\n{}\n```",
        fence_language(*language),
        code.trim_end_matches('\n')
    )
}

fn render_quote(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    ctx: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let text = render_paragraph(r, node, ctx, warnings);
    if text.trim().is_empty() {
        String::new()
    } else {
        quote_lines(&text)
    }
}

fn render_callout(
    _: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    _: &mut Vec<Warning>,
) -> String {
    let BlockContent::Callout { emoji } = &node.block.content else {
        return String::new();
    };
    format!("> {}", callout_emoji(emoji.as_deref()))
}

fn render_divider(
    _: &MarkdownBlockRenderer<'_>,
    _: &TreeNode,
    _: &FormatContext,
    _: &mut Vec<Warning>,
) -> String {
    "---".to_string()
}

fn render_media(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let Some(reference) = node.block.content.media() else {
        return String::new();
    };

    let asset = match r.resolutions.media.get(&reference.token) {
        Some(Ok(asset)) => asset,
        Some(Err(reason)) => return media_unavailable(reference, reason, warnings),
        None => return media_unavailable(reference, "not resolved", warnings),
    };

    if let Some(reason) = &asset.download_error {
        warnings.push(
            Warning::new(
                WarningKind::MediaDownloadFailed,
                format!("{} download failed, linking remote copy: {}", reference.kind.as_str(), reason),
            )
            .with_context(reference.token.clone()),
        );
    }

    match (reference.kind, asset.href()) {
        (MediaKind::Image, Some(href)) => format!("![image]({})", href),
        (MediaKind::File, Some(href)) => format!("📎 [{}]({})", reference.display_name(), href),
        (MediaKind::Board, Some(href)) => format!("![whiteboard]({})", href),
        (MediaKind::Board, None) => format!("[whiteboard: {}]", reference.token),
        (_, None) => media_unavailable(reference, "no link available", warnings),
    }
}

fn render_sheet(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let BlockContent::Sheet(sheet) = &node.block.content else {
        return String::new();
    };
    let key = sheet_key(&sheet.token, &sheet.sheet_id);
    let marker = format!("<!-- sheet: {} -->", key);
    r.embed(marker, &key, r.resolutions.sheets.get(&key), warnings)
}

fn render_bitable(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let BlockContent::Bitable(bitable) = &node.block.content else {
        return String::new();
    };
    let key = bitable_key(
        &bitable.app_token,
        &bitable.table_id,
        bitable.view_id.as_deref(),
    );
    let marker = format!(
        "<!-- bitable: {} -->",
        bitable_key(&bitable.app_token, &bitable.table_id, None)
    );
    r.embed(marker, &key, r.resolutions.bitables.get(&key), warnings)
}

impl MarkdownBlockRenderer<'_> {
    fn embed(
        &self,
        marker: String,
        key: &str,
        data: Option<&Result<TabularData, String>>,
        warnings: &mut Vec<Warning>,
    ) -> String {
        if !self.options.inline_embedded {
            return marker;
        }
        match data {
            Some(Ok(data)) => format!("{}\n\n{}", marker, self.render_tabular(data)),
            Some(Err(reason)) => {
                warnings.push(
                    Warning::new(WarningKind::EmbeddedUnavailable, reason.clone()).with_context(key),
                );
                marker
            }
            None => {
                warnings.push(
                    Warning::new(WarningKind::EmbeddedUnavailable, "embedded data was not fetched")
                        .with_context(key),
                );
                marker
            }
        }
    }
}

fn render_table(
    r: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    ctx: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let BlockContent::Table(geometry) = &node.block.content else {
        return String::new();
    };
    let slots = tables::layout(geometry);
    let cell_ctx = ctx.enter_table_cell();
    let mut grid = tables::fill(&slots, |id| r.render_cell(id, &cell_ctx, warnings));
    grid.headerless = !geometry.header_row;
    tables::render_grid(&grid, r.options.table_format)
}

fn render_unknown(
    _: &MarkdownBlockRenderer<'_>,
    node: &TreeNode,
    _: &FormatContext,
    warnings: &mut Vec<Warning>,
) -> String {
    let BlockContent::Unknown { type_code } = node.block.content else {
        return String::new();
    };
    warnings.push(
        Warning::new(
            WarningKind::UnsupportedBlock,
            format!("block type {} is not supported", type_code),
        )
        .with_context(node.block.id.to_string()),
    );
    format!("[unsupported block: type {}]", type_code)
}

// --- Helpers ---

fn media_unavailable(reference: &MediaReference, reason: &str, warnings: &mut Vec<Warning>) -> String {
    warnings.push(
        Warning::new(
            WarningKind::MediaUnavailable,
            format!("{} could not be resolved: {}", reference.kind.as_str(), reason),
        )
        .with_context(reference.token.clone()),
    );
    match reference.kind {
        MediaKind::Image => "[image unavailable]".to_string(),
        MediaKind::File => format!("📎 {} (unavailable)", reference.display_name()),
        MediaKind::Board => "[whiteboard unavailable]".to_string(),
    }
}

fn inaccessible(id: &BlockId, parent: &BlockId) -> Warning {
    Warning::new(
        WarningKind::InaccessibleBlock,
        format!("child of '{}' was not fetched", parent),
    )
    .with_context(id.to_string())
}

fn callout_emoji(emoji_id: Option<&str>) -> &str {
    match emoji_id {
        Some(id) => match CALLOUT_EMOJI.get(id) {
            Some(emoji) => *emoji,
            None if !id.is_ascii() => id,
            None => DEFAULT_CALLOUT_EMOJI,
        },
        None => DEFAULT_CALLOUT_EMOJI,
    }
}

/// Joins sibling renderings: list runs tightly, everything else with a
/// blank line.
fn join_parts(parts: Vec<(bool, String)>) -> String {
    let mut output = String::new();
    let mut previous_is_list = false;

    for (i, (is_list, text)) in parts.into_iter().enumerate() {
        if i > 0 {
            output.push_str(if previous_is_list && is_list { "\n" } else { "\n\n" });
        }
        output.push_str(&text);
        previous_is_list = is_list;
    }

    output
}

fn indent_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", LIST_INDENT, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn quote_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
