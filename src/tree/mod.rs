use std::fmt::{self, Display};

use anyhow::bail;
use fixedbitset::FixedBitSet;
use log::debug;

use crate::Result;

pub mod tree_node;
pub mod tree_parser;

pub use tree_node::Node;
use NodeIdx::{Internal as Int, Leaf};

#[derive(Debug, PartialEq, Clone, Copy, PartialOrd, Eq, Ord, Hash)]
pub enum NodeIdx {
    Internal(usize),
    Leaf(usize),
}

impl From<NodeIdx> for usize {
    fn from(node_idx: NodeIdx) -> usize {
        match node_idx {
            Int(idx) => idx,
            Leaf(idx) => idx,
        }
    }
}

impl From<&NodeIdx> for usize {
    fn from(node_idx: &NodeIdx) -> usize {
        usize::from(*node_idx)
    }
}

impl Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int(idx) => write!(f, "Internal node {}", idx),
            Leaf(idx) => write!(f, "Leaf node {}", idx),
        }
    }
}

/// Rooted binary tree with node heights.
///
/// Nodes are stored densely, `usize::from(idx)` being the position of a node in
/// [`Tree::iter`] and in any per-node parameter (node types, occupancies, rates).
/// Heights are measured backwards in time: the root is the oldest node and the
/// deepest leaf sits at height zero.
#[derive(Debug, Clone)]
pub struct Tree {
    pub root: NodeIdx,
    pub(crate) nodes: Vec<Node>,
    pub postorder: Vec<NodeIdx>,
    pub preorder: Vec<NodeIdx>,
    pub complete: bool,
    /// Number of leaves.
    pub n: usize,
    /// Root height, equal to the longest root-to-leaf path.
    pub height: f64,
    pub(crate) leaf_ids: Vec<String>,
    pub(crate) dirty: FixedBitSet,
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_newick())
    }
}

impl Tree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|node| node.is_leaf()).collect()
    }

    pub fn internals(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|node| !node.is_leaf()).collect()
    }

    pub fn node(&self, node_idx: &NodeIdx) -> &Node {
        &self.nodes[usize::from(node_idx)]
    }

    pub fn node_id(&self, node_idx: &NodeIdx) -> &str {
        &self.nodes[usize::from(node_idx)].id
    }

    pub fn leaf_ids(&self) -> &[String] {
        &self.leaf_ids
    }

    pub fn parent(&self, node_idx: &NodeIdx) -> Option<&NodeIdx> {
        self.nodes[usize::from(node_idx)].parent.as_ref()
    }

    pub fn children(&self, node_idx: &NodeIdx) -> &[NodeIdx] {
        &self.nodes[usize::from(node_idx)].children
    }

    pub fn blen(&self, node_idx: &NodeIdx) -> f64 {
        self.nodes[usize::from(node_idx)].blen
    }

    pub fn height(&self, node_idx: &NodeIdx) -> f64 {
        self.nodes[usize::from(node_idx)].height
    }

    pub fn is_root(&self, node_idx: &NodeIdx) -> bool {
        *node_idx == self.root
    }

    pub fn try_idx(&self, id: &str) -> Result<NodeIdx> {
        match self.nodes.iter().find(|node| node.id == id) {
            Some(node) => Ok(node.idx),
            None => bail!("No node with id {} found in the tree", id),
        }
    }

    pub fn by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Sets the length of the branch above the node and recomputes node heights.
    /// The node and every node below it are marked as dirty.
    pub fn set_blen(&mut self, node_idx: &NodeIdx, blen: f64) -> Result<()> {
        if !blen.is_finite() || blen < 0.0 {
            bail!("Branch length must be finite and non-negative, got {}", blen);
        }
        self.nodes[usize::from(node_idx)].blen = blen;
        self.compute_heights();
        self.mark_subtree_dirty(node_idx);
        Ok(())
    }

    pub fn mark_subtree_dirty(&mut self, subroot: &NodeIdx) {
        for node_idx in self.preorder_subroot(subroot) {
            self.dirty.insert(usize::from(node_idx));
        }
    }

    pub fn is_dirty(&self, node_idx: &NodeIdx) -> bool {
        self.dirty.contains(usize::from(node_idx))
    }

    pub fn something_is_dirty(&self) -> bool {
        !self.dirty.is_clear()
    }

    pub fn clean(&mut self) {
        self.dirty.clear();
    }

    pub fn preorder_subroot(&self, subroot: &NodeIdx) -> Vec<NodeIdx> {
        let mut order = Vec::<NodeIdx>::with_capacity(self.nodes.len());
        let mut stack = vec![*subroot];
        while let Some(node_idx) = stack.pop() {
            order.push(node_idx);
            for child in self.children(&node_idx).iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    pub(crate) fn compute_preorder(&mut self) {
        self.preorder = self.preorder_subroot(&self.root);
    }

    pub(crate) fn compute_postorder(&mut self) {
        let mut order = Vec::<NodeIdx>::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(node_idx) = stack.pop() {
            order.push(node_idx);
            stack.extend(self.children(&node_idx).iter());
        }
        order.reverse();
        self.postorder = order;
    }

    pub(crate) fn compute_heights(&mut self) {
        let mut depths = vec![0.0; self.nodes.len()];
        for node_idx in &self.preorder {
            if let Some(parent) = self.nodes[usize::from(node_idx)].parent {
                depths[usize::from(node_idx)] =
                    depths[usize::from(parent)] + self.nodes[usize::from(node_idx)].blen;
            }
        }
        self.height = depths.iter().cloned().fold(0.0, f64::max);
        for (node, depth) in self.nodes.iter_mut().zip(depths) {
            node.height = self.height - depth;
        }
        debug!("Tree height set to {}", self.height);
    }

    /// Returns the tree in newick format, the root written without a branch length.
    pub fn to_newick(&self) -> String {
        self.to_newick_annotated(|_| None)
    }

    /// Returns the tree in newick format with an optional `[&...]` comment after every
    /// node label, e.g. `(A[&type="0"]:1,B[&type="1"]:1)R[&type="0"];`.
    pub fn to_newick_annotated<F>(&self, annotate: F) -> String
    where
        F: Fn(&NodeIdx) -> Option<String>,
    {
        let mut subtrees: Vec<String> = vec![String::new(); self.nodes.len()];
        for node_idx in &self.postorder {
            let node = self.node(node_idx);
            let mut newick = String::new();
            if !node.children.is_empty() {
                let children: Vec<String> = node
                    .children
                    .iter()
                    .map(|child| std::mem::take(&mut subtrees[usize::from(child)]))
                    .collect();
                newick.push('(');
                newick.push_str(&children.join(","));
                newick.push(')');
            }
            newick.push_str(&node.id);
            if let Some(annotation) = annotate(node_idx) {
                newick.push_str(&format!("[&{}]", annotation));
            }
            if !node.is_root() {
                newick.push_str(&format!(":{}", node.blen));
            }
            subtrees[usize::from(node_idx)] = newick;
        }
        format!("{};", std::mem::take(&mut subtrees[usize::from(self.root)]))
    }
}

#[cfg(test)]
mod tests;
