//! Arena tree assembled from a flat, parent-pointer block list.
//!
//! Nodes live in a `Vec` and refer to each other by index. The structure is
//! validated (one root, no orphans, no cycles) before anything walks it, so
//! traversals never need depth limits.

use super::block::Block;
use crate::error::StructuralError;
use crate::types::BlockId;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// A child position declared by a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildSlot {
    /// The child was fetched; index into the arena.
    Present(usize),
    /// The parent lists this id but the fetch didn't return it.
    Missing(BlockId),
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub block: Block,
    pub parent: Option<usize>,
    pub children: Vec<ChildSlot>,
    pub depth: usize,
}

/// The rooted, validated block tree of one document.
#[derive(Debug, Clone)]
pub struct DocumentTree {
    nodes: Vec<TreeNode>,
    index: HashMap<BlockId, usize>,
    root: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    OnPath,
    Done,
}

impl DocumentTree {
    /// Builds the tree, validating its structure first.
    ///
    /// A block that appears twice keeps its first position and its last
    /// content.
    pub fn build(blocks: impl IntoIterator<Item = Block>) -> Result<Self, StructuralError> {
        let mut by_id: IndexMap<BlockId, Block> = IndexMap::new();
        for block in blocks {
            by_id.insert(block.id.clone(), block);
        }

        let index: HashMap<BlockId, usize> = by_id
            .keys()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let root = find_single_root(&by_id)?;

        let mut parents: Vec<Option<usize>> = Vec::with_capacity(by_id.len());
        for block in by_id.values() {
            match &block.parent_id {
                None => parents.push(None),
                Some(parent_id) => match index.get(parent_id) {
                    Some(&p) => parents.push(Some(p)),
                    None => {
                        return Err(StructuralError::OrphanBlock {
                            block_id: block.id.to_string(),
                            parent_id: parent_id.to_string(),
                        })
                    }
                },
            }
        }

        if let Some(at) = find_cycle(&parents) {
            return Err(StructuralError::BlockCycle {
                block_id: by_id
                    .get_index(at)
                    .map(|(id, _)| id.to_string())
                    .unwrap_or_default(),
            });
        }

        let blocks: Vec<Block> = by_id.into_values().collect();
        let children = link_children(&blocks, &parents, &index);

        let mut nodes: Vec<TreeNode> = blocks
            .into_iter()
            .zip(parents)
            .zip(children)
            .map(|((block, parent), children)| TreeNode {
                block,
                parent,
                children,
                depth: 0,
            })
            .collect();

        assign_depths(&mut nodes, root);

        log::debug!(
            "Built document tree: {} blocks, root '{}'",
            nodes.len(),
            nodes[root].block.id
        );

        Ok(Self { nodes, index, root })
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, index: usize) -> &TreeNode {
        &self.nodes[index]
    }

    pub fn get(&self, id: &BlockId) -> Option<&TreeNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn index_of(&self, id: &BlockId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter()
    }

    /// Plain-text document title from the root page block.
    pub fn title(&self) -> String {
        self.nodes[self.root]
            .block
            .content
            .text()
            .map(|t| t.plain_text().trim().to_string())
            .unwrap_or_default()
    }

    /// Arena indices in pre-order, children in tree order.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Child ids declared by their parents but absent from the fetch.
    pub fn missing_children(&self) -> impl Iterator<Item = (&BlockId, &BlockId)> {
        self.nodes.iter().flat_map(|node| {
            node.children.iter().filter_map(move |slot| match slot {
                ChildSlot::Missing(id) => Some((&node.block.id, id)),
                ChildSlot::Present(_) => None,
            })
        })
    }

    /// Present children of a node, in order.
    pub fn present_children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[index].children.iter().filter_map(|slot| match slot {
            ChildSlot::Present(i) => Some(*i),
            ChildSlot::Missing(_) => None,
        })
    }
}

/// Pre-order iterator over arena indices.
pub struct Preorder<'a> {
    tree: &'a DocumentTree,
    stack: Vec<usize>,
}

impl Iterator for Preorder<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.stack.pop()?;
        let children: Vec<usize> = self.tree.present_children(current).collect();
        self.stack.extend(children.into_iter().rev());
        Some(current)
    }
}

fn find_single_root(by_id: &IndexMap<BlockId, Block>) -> Result<usize, StructuralError> {
    let roots: Vec<usize> = by_id
        .values()
        .enumerate()
        .filter(|(_, block)| block.is_root())
        .map(|(i, _)| i)
        .collect();

    match roots.as_slice() {
        [] => Err(StructuralError::NoRoot),
        [single] => Ok(*single),
        many => Err(StructuralError::MultipleRoots {
            roots: many
                .iter()
                .filter_map(|&i| by_id.get_index(i).map(|(id, _)| id.to_string()))
                .collect(),
        }),
    }
}

/// Walks parent pointers from every node; returns a node on a cycle.
fn find_cycle(parents: &[Option<usize>]) -> Option<usize> {
    let mut state = vec![Visit::Unseen; parents.len()];

    for start in 0..parents.len() {
        let mut path = Vec::new();
        let mut current = Some(start);

        while let Some(node) = current {
            match state[node] {
                Visit::Done => break,
                Visit::OnPath => return Some(node),
                Visit::Unseen => {
                    state[node] = Visit::OnPath;
                    path.push(node);
                    current = parents[node];
                }
            }
        }

        for node in path {
            state[node] = Visit::Done;
        }
    }

    None
}

/// Orders each node's children: declared order first, then undeclared
/// children in fetch order.
fn link_children(
    blocks: &[Block],
    parents: &[Option<usize>],
    index: &HashMap<BlockId, usize>,
) -> Vec<Vec<ChildSlot>> {
    let mut by_parent: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];
    for (child, parent) in parents.iter().enumerate() {
        if let Some(p) = parent {
            by_parent[*p].push(child);
        }
    }

    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let mut claimed = HashSet::new();
            let mut slots = Vec::with_capacity(block.children.len());

            for child_id in &block.children {
                match index.get(child_id) {
                    Some(&c) if parents[c] == Some(i) => {
                        if claimed.insert(c) {
                            slots.push(ChildSlot::Present(c));
                        }
                    }
                    Some(_) => {
                        log::debug!(
                            "Block '{}' lists '{}' whose parent pointer names another block",
                            block.id,
                            child_id
                        );
                    }
                    None => slots.push(ChildSlot::Missing(child_id.clone())),
                }
            }

            for &c in &by_parent[i] {
                if claimed.insert(c) {
                    slots.push(ChildSlot::Present(c));
                }
            }

            slots
        })
        .collect()
}

fn assign_depths(nodes: &mut [TreeNode], root: usize) {
    let mut stack = vec![(root, 0usize)];
    while let Some((i, depth)) = stack.pop() {
        nodes[i].depth = depth;
        let children: Vec<usize> = nodes[i]
            .children
            .iter()
            .filter_map(|slot| match slot {
                ChildSlot::Present(c) => Some(*c),
                ChildSlot::Missing(_) => None,
            })
            .collect();
        stack.extend(children.into_iter().map(|c| (c, depth + 1)));
    }
}
