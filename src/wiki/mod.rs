// src/wiki/mod.rs
//! Knowledge-base traversal.
//!
//! A wiki export runs in two passes. Discovery walks the node tree
//! depth-first in server order, one listing at a time. Export then renders
//! every discovered node concurrently while keeping discovery order in the
//! assembled output.

use crate::constants::MAX_HEADING_LEVEL;
use crate::error::{AppError, StructuralError};
use crate::error_recovery::retry_with_backoff;
use crate::export::{heading, Exporter, Section};
use crate::model::{WikiNode, WikiObjType};
use crate::progress::ProgressEvent;
use crate::types::{
    BitableToken, BoardToken, DocumentId, SpreadsheetToken, Warning, WarningKind, WikiNodeToken,
};
use futures::{stream, StreamExt};
use im::HashSet;

/// One position in the flattened wiki tree.
#[derive(Debug, Clone)]
enum Entry {
    Node { node: WikiNode, depth: usize },
    /// A child that points back at one of its ancestors.
    Cycle { node: WikiNode, depth: usize },
}

struct Pending {
    node: WikiNode,
    depth: usize,
    /// Node tokens from the root down to, and including, the parent.
    ancestors: HashSet<String>,
}

/// Exports a wiki node and all its descendants as one Markdown payload.
pub(crate) struct WikiTraversal<'a> {
    exporter: &'a Exporter,
}

impl<'a> WikiTraversal<'a> {
    pub fn new(exporter: &'a Exporter) -> Self {
        Self { exporter }
    }

    pub(crate) async fn export_space(&self, root: &WikiNodeToken) -> Result<Section, AppError> {
        let ctx = self.exporter.context();
        let repository = ctx.repository.as_ref();

        let root_node = retry_with_backoff(|| repository.wiki_node(root), ctx.retry)
            .await
            .map_err(|e| e.into_permission(format!("wiki node {}", root)))?;
        let title = root_node.display_title().to_string();

        let mut warnings = Vec::new();
        let entries = self.discover(root_node, &mut warnings).await?;
        log::info!("Wiki '{}': {} nodes discovered", title, entries.len());

        let limit = ctx.concurrency.max(1);
        let sections: Vec<Result<Section, AppError>> = stream::iter(0..entries.len())
            .map(|i| self.export_entry(&entries[i]))
            .buffered(limit)
            .collect()
            .await;

        let mut parts = Vec::with_capacity(sections.len());
        for (index, (entry, section)) in entries.iter().zip(sections).enumerate() {
            let section = match section {
                Ok(section) => section,
                Err(e) if e.is_fatal() || index == 0 => return Err(e),
                Err(e) => self.failed_branch(entry, e),
            };
            warnings.extend(section.warnings);
            if !section.markdown.trim().is_empty() {
                parts.push(section.markdown);
            }
        }

        Ok(Section {
            title,
            markdown: parts.join("\n\n"),
            warnings,
        })
    }

    /// Pre-order walk of the tree below `root`, root first.
    ///
    /// A listing failure keeps the node but drops its subtree; only fatal
    /// failures abort discovery.
    async fn discover(
        &self,
        root: WikiNode,
        warnings: &mut Vec<Warning>,
    ) -> Result<Vec<Entry>, AppError> {
        let ctx = self.exporter.context();
        let repository = ctx.repository.as_ref();

        let mut entries = Vec::new();
        let mut stack = vec![Pending {
            node: root,
            depth: 0,
            ancestors: HashSet::new(),
        }];

        while let Some(Pending {
            node,
            depth,
            ancestors,
        }) = stack.pop()
        {
            ctx.cancel.check()?;

            let token = node.node_token.as_str().to_string();
            if ancestors.contains(&token) {
                let cycle = StructuralError::WikiCycle {
                    node_token: token.clone(),
                };
                log::warn!("{}", cycle);
                warnings.push(
                    Warning::new(WarningKind::Structural, cycle.to_string())
                        .with_context(node.display_title().to_string()),
                );
                entries.push(Entry::Cycle { node, depth });
                continue;
            }

            ctx.observer.on_event(ProgressEvent::WikiNodeVisited {
                node_token: token.clone(),
                title: node.display_title().to_string(),
                depth,
            });
            log::debug!("Visiting wiki node {} at depth {}", token, depth);

            if node.has_child {
                let listed = retry_with_backoff(
                    || repository.wiki_children(&node.space_id, &node.node_token),
                    ctx.retry,
                )
                .await;
                match listed {
                    Ok(children) => {
                        let lineage = ancestors.update(token.clone());
                        // Reversed so the first child is popped first.
                        stack.extend(children.into_iter().rev().map(|child| Pending {
                            node: child,
                            depth: depth + 1,
                            ancestors: lineage.clone(),
                        }));
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        log::warn!("Could not list children of wiki node {}: {}", token, e);
                        warnings.push(
                            Warning::new(
                                WarningKind::BranchFailed,
                                format!("children could not be listed: {}", e),
                            )
                            .with_context(node.display_title().to_string()),
                        );
                    }
                }
            }

            entries.push(Entry::Node { node, depth });
        }

        Ok(entries)
    }

    async fn export_entry(&self, entry: &Entry) -> Result<Section, AppError> {
        let (node, depth) = match entry {
            Entry::Cycle { node, .. } => {
                return Ok(Section {
                    title: node.display_title().to_string(),
                    markdown: format!("[wiki cycle: {}]", node.display_title()),
                    warnings: Vec::new(),
                })
            }
            Entry::Node { node, depth } => (node, *depth),
        };

        let title_line = heading(depth + 1, node.display_title());
        let body_level = (depth + 2).min(MAX_HEADING_LEVEL);

        let body = match &node.obj_type {
            WikiObjType::Docx => Some(
                self.exporter
                    .document_section(&DocumentId::from_raw(node.obj_token.as_str()), false)
                    .await?,
            ),
            WikiObjType::Sheet => Some(
                self.exporter
                    .spreadsheet_section(
                        &SpreadsheetToken::from_raw(node.obj_token.as_str()),
                        None,
                        None,
                    )
                    .await
                    .map(|section| shift_sheet_headings(section, body_level))?,
            ),
            WikiObjType::Bitable => Some(
                self.exporter
                    .bitable_section(
                        &BitableToken::from_raw(node.obj_token.as_str()),
                        None,
                        None,
                        None,
                    )
                    .await
                    .map(|section| shift_sheet_headings(section, body_level))?,
            ),
            WikiObjType::Other(kind) if kind == "board" || kind == "whiteboard" => Some(
                self.exporter
                    .board_section(&BoardToken::from_raw(node.obj_token.as_str()))
                    .await?,
            ),
            other => {
                log::info!(
                    "Wiki node {} is a {}; linking instead of exporting",
                    node.node_token,
                    other.as_str()
                );
                None
            }
        };

        let (markdown, warnings) = match body {
            Some(section) if section.markdown.trim().is_empty() => (title_line, section.warnings),
            Some(section) => (
                format!("{}\n\n{}", title_line, section.markdown.trim_end()),
                section.warnings,
            ),
            None => (
                format!(
                    "{}\n\n[{}: {}]",
                    title_line,
                    node.obj_type.as_str(),
                    node.obj_token
                ),
                Vec::new(),
            ),
        };

        Ok(Section {
            title: node.display_title().to_string(),
            markdown,
            warnings,
        })
    }

    fn failed_branch(&self, entry: &Entry, error: AppError) -> Section {
        let (node, depth) = match entry {
            Entry::Node { node, depth } | Entry::Cycle { node, depth } => (node, *depth),
        };
        log::warn!("Wiki node {} failed: {}", node.node_token, error);

        Section {
            title: node.display_title().to_string(),
            markdown: format!(
                "{}\n\n[export failed: {}]",
                heading(depth + 1, node.display_title()),
                node.obj_token
            ),
            warnings: vec![Warning::new(WarningKind::BranchFailed, error.to_string())
                .with_context(node.display_title().to_string())],
        }
    }
}

/// Re-levels the `## sheet` headings of a tabular section so they nest
/// under a wiki node heading.
fn shift_sheet_headings(mut section: Section, level: usize) -> Section {
    let marker = format!("{} ", "#".repeat(level.clamp(1, MAX_HEADING_LEVEL)));
    section.markdown = section
        .markdown
        .lines()
        .map(|line| match line.strip_prefix("## ") {
            Some(rest) => format!("{}{}", marker, rest),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n");
    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryRepository;
    use crate::error_recovery::RetryPolicy;
    use crate::export::ExportContext;
    use crate::model::{Block, BlockContent, TextPayload};
    use crate::progress::ChannelObserver;
    use crate::types::ResourceRef;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn node(token: &str, title: &str, has_child: bool) -> WikiNode {
        WikiNode {
            space_id: "space".to_string(),
            node_token: WikiNodeToken::from_raw(token),
            obj_token: format!("dox{}", token),
            obj_type: WikiObjType::Docx,
            parent_node_token: None,
            title: title.to_string(),
            has_child,
        }
    }

    fn doc(repository: InMemoryRepository, token: &str, body: &str) -> InMemoryRepository {
        let id = format!("dox{}", token);
        repository.with_document(
            &id,
            vec![
                Block::new(id.as_str(), BlockContent::Page(TextPayload::plain(token)))
                    .with_children(["p"]),
                Block::new("p", BlockContent::Text(TextPayload::plain(body)))
                    .with_parent(id.as_str()),
            ],
        )
    }

    fn space() -> InMemoryRepository {
        let mut repository = InMemoryRepository::new()
            .with_wiki_node(node("nodA", "A", true), &["nodB", "nodC"])
            .with_wiki_node(node("nodB", "B", true), &["nodD"])
            .with_wiki_node(node("nodC", "C", false), &[])
            .with_wiki_node(node("nodD", "D", false), &[]);
        for (token, body) in [("nodA", "a"), ("nodB", "b"), ("nodC", "c"), ("nodD", "d")] {
            repository = doc(repository, token, body);
        }
        repository
    }

    fn exporter(repository: InMemoryRepository) -> Exporter {
        Exporter::new(
            ExportContext::new(Arc::new(repository))
                .with_retry(RetryPolicy::immediate(1))
                .with_concurrency(3),
        )
    }

    #[tokio::test]
    async fn test_nodes_are_exported_in_preorder() {
        let (observer, mut events) = ChannelObserver::new();
        let exporter = Exporter::new(
            ExportContext::new(Arc::new(space()))
                .with_retry(RetryPolicy::immediate(1))
                .with_observer(Arc::new(observer))
                .with_concurrency(4),
        );

        let outcome = exporter
            .export(&ResourceRef::parse("wiki:nodA").unwrap())
            .await
            .unwrap();

        assert_eq!(outcome.title, "A");
        assert_eq!(
            outcome.markdown.as_str(),
            "# A\n\na\n\n## B\n\nb\n\n### D\n\nd\n\n## C\n\nc\n"
        );
        assert!(outcome.warnings.is_empty());

        let mut visited = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ProgressEvent::WikiNodeVisited { title, depth, .. } = event {
                visited.push((title, depth));
            }
        }
        assert_eq!(
            visited,
            vec![
                ("A".to_string(), 0),
                ("B".to_string(), 1),
                ("D".to_string(), 2),
                ("C".to_string(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_cycle_is_confined_to_its_branch() {
        let repository = space()
            .with_wiki_node(node("nodD", "D", true), &["nodA"]);

        let outcome = exporter(repository)
            .export(&ResourceRef::parse("wiki:nodA").unwrap())
            .await
            .unwrap();

        assert_eq!(
            outcome.markdown.as_str(),
            "# A\n\na\n\n## B\n\nb\n\n### D\n\nd\n\n[wiki cycle: A]\n\n## C\n\nc\n"
        );
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::Structural);
    }

    #[tokio::test]
    async fn test_failed_branch_keeps_siblings() {
        let repository = space().failing("blocks:doxnodB:0", 1770032);

        let outcome = exporter(repository)
            .export(&ResourceRef::parse("wiki:nodA").unwrap())
            .await
            .unwrap();

        assert!(outcome.markdown.as_str().contains("## B\n\n[export failed: doxnodB]"));
        assert!(outcome.markdown.as_str().contains("### D\n\nd"));
        assert!(outcome.markdown.as_str().contains("## C\n\nc"));
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::BranchFailed);
    }

    #[tokio::test]
    async fn test_unlistable_children_are_a_branch_warning() {
        let repository = space().failing("wiki_children:nodB", 131006);

        let outcome = exporter(repository)
            .export(&ResourceRef::parse("wiki:nodA").unwrap())
            .await
            .unwrap();

        assert!(!outcome.markdown.as_str().contains("### D"));
        assert!(outcome.markdown.as_str().contains("## C"));
        assert_eq!(outcome.warnings[0].kind, WarningKind::BranchFailed);
    }

    #[tokio::test]
    async fn test_auth_failure_in_a_branch_is_fatal() {
        let repository = space().failing("blocks:doxnodC:0", 99991663);

        let result = exporter(repository)
            .export(&ResourceRef::parse("wiki:nodA").unwrap())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_exportable_nodes_are_labeled() {
        let mut mindmap = node("nodM", "Map", false);
        mindmap.obj_type = WikiObjType::Mindnote;
        mindmap.obj_token = "mmcnX".to_string();
        let repository = space()
            .with_wiki_node(node("nodC", "C", true), &["nodM"])
            .with_wiki_node(mindmap, &[]);

        let outcome = exporter(repository)
            .export(&ResourceRef::parse("wiki:nodA").unwrap())
            .await
            .unwrap();
        assert!(outcome.markdown.as_str().ends_with("### Map\n\n[mindnote: mmcnX]\n"));
    }

    #[test]
    fn test_sheet_headings_are_shifted() {
        let section = Section {
            markdown: "## Q1\n\n| a |\n| --- |".to_string(),
            ..Default::default()
        };
        assert_eq!(
            shift_sheet_headings(section, 4).markdown,
            "#### Q1\n\n| a |\n| --- |"
        );
    }
}
