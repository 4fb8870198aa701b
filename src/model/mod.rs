//! Domain model: blocks, the document tree, wiki nodes and tabular data.

mod block;
pub mod blocks;
pub mod tabular;
pub mod tree;
mod wiki;

pub use block::{Block, BlockContent, BlockTag};
pub use blocks::*;
pub use tabular::{
    BitableField, BitableRecord, BitableTable, SheetInfo, SpreadsheetInfo, TabularData,
};
pub use tree::{ChildSlot, DocumentTree, TreeNode};
pub use wiki::{WikiNode, WikiObjType};
