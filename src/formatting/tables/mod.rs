// src/formatting/tables/mod.rs
//! Table rendering for document tables, spreadsheets and bitables.
//!
//! Every source is first laid out as a rectangular [`CellGrid`], merges
//! included, and then rendered as either a Markdown or an HTML table.

mod grid;
mod render;
pub mod values;

pub use grid::{fill, layout, GridSlot};
pub use render::{
    escape_for_html_cell, escape_for_table, HtmlTableRenderer, MarkdownTableRenderer,
    TableRenderer,
};

use crate::types::ValidationError;
use std::str::FromStr;

/// Output format for tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    /// Pipe tables; merged cells repeat their text.
    Markdown,
    /// HTML tables with `rowspan`/`colspan`.
    Html,
    /// Markdown unless a merge is present.
    #[default]
    Auto,
}

impl TableFormat {
    pub fn use_html(&self, has_merges: bool) -> bool {
        match self {
            TableFormat::Markdown => false,
            TableFormat::Html => true,
            TableFormat::Auto => has_merges,
        }
    }
}

impl FromStr for TableFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(TableFormat::Markdown),
            "html" => Ok(TableFormat::Html),
            "auto" => Ok(TableFormat::Auto),
            other => Err(ValidationError::InvalidOption {
                option: "table",
                reason: format!("'{}' is not one of md, html, auto", other),
            }),
        }
    }
}

/// One position of a laid-out table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub row_span: usize,
    pub col_span: usize,
    /// Inside another cell's merge; `text` repeats the origin's.
    pub covered: bool,
}

impl Cell {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            row_span: 1,
            col_span: 1,
            covered: false,
        }
    }
}

/// A rectangular table, row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellGrid {
    pub rows: Vec<Vec<Cell>>,
    /// No row is a header; Markdown output gets an empty one.
    pub headerless: bool,
}

impl CellGrid {
    /// A grid without merges; short rows are padded.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            rows: rows
                .into_iter()
                .map(|mut row| {
                    row.resize(width, String::new());
                    row.into_iter().map(Cell::plain).collect()
                })
                .collect(),
            headerless: false,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0 || self.column_count() == 0
    }

    pub fn has_merges(&self) -> bool {
        self.rows.iter().flatten().any(|c| c.covered)
    }
}

/// Renders `grid` in `format`.
pub fn render_grid(grid: &CellGrid, format: TableFormat) -> String {
    if format.use_html(grid.has_merges()) {
        HtmlTableRenderer.render(grid)
    } else {
        MarkdownTableRenderer.render(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_format_parsing() {
        assert_eq!("md".parse::<TableFormat>().unwrap(), TableFormat::Markdown);
        assert_eq!("HTML".parse::<TableFormat>().unwrap(), TableFormat::Html);
        assert!("csv".parse::<TableFormat>().is_err());
    }

    #[test]
    fn test_auto_switches_to_html_on_merge() {
        assert!(!TableFormat::Auto.use_html(false));
        assert!(TableFormat::Auto.use_html(true));
        assert!(!TableFormat::Markdown.use_html(true));
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let grid = CellGrid::from_rows(vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
        ]);
        assert_eq!(grid.column_count(), 2);
        assert_eq!(grid.rows[1][1], Cell::plain(""));
    }
}
