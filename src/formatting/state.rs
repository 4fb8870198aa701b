// src/formatting/state.rs
//! Immutable formatting state with pure transitions for Markdown generation.
//!
//! A context is handed down the tree walk; every transition returns a new
//! value, so siblings never observe each other's state.

/// Where in the document a block is being rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatContext {
    /// Nesting depth below the page root.
    depth: usize,
    /// List items between this block and the root.
    list_depth: usize,
    /// Quote-like containers between this block and the root.
    quote_depth: usize,
    /// Number assigned to the current ordered list item.
    ordinal: Option<u32>,
    /// Inside a table cell, where only inline-safe output is allowed.
    in_table_cell: bool,
}

impl FormatContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn list_depth(&self) -> usize {
        self.list_depth
    }

    pub fn quote_depth(&self) -> usize {
        self.quote_depth
    }

    pub fn ordinal(&self) -> Option<u32> {
        self.ordinal
    }

    pub fn in_table_cell(&self) -> bool {
        self.in_table_cell
    }

    /// Context for the children of the current block.
    pub fn enter_children(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ordinal: None,
            ..self.clone()
        }
    }

    /// Context for the children of a list item.
    pub fn enter_list(&self) -> Self {
        Self {
            list_depth: self.list_depth + 1,
            ..self.enter_children()
        }
    }

    /// Context for the children of a quote, quote container or callout.
    pub fn enter_quote(&self) -> Self {
        Self {
            quote_depth: self.quote_depth + 1,
            ..self.enter_children()
        }
    }

    /// Context for the content of a table cell.
    pub fn enter_table_cell(&self) -> Self {
        Self {
            in_table_cell: true,
            ..self.enter_children()
        }
    }

    /// The same position, numbered as ordered item `n`.
    pub fn with_ordinal(&self, n: u32) -> Self {
        Self {
            ordinal: Some(n),
            ..self.clone()
        }
    }
}
