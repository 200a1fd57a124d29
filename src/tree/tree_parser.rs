use std::fmt;
use std::result::Result as stdResult;

use anyhow::bail;
use fixedbitset::FixedBitSet;
use log::info;
use pest::{
    error::{Error as PestError, ErrorVariant},
    iterators::Pair,
    Parser,
};
use pest_derive::Parser;

use crate::tree::{
    Node,
    NodeIdx::{Internal as Int, Leaf},
    Tree,
};
use crate::Result;

#[derive(Parser)]
#[grammar = "./tree/newick.pest"]
pub struct NewickParser;

#[derive(Debug)]
pub struct ParsingError(pub(crate) Box<PestError<Rule>>);

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Malformed newick string")?;
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParsingError {}

/// Parses every tree in the newick string. Only rooted, strictly binary trees are accepted;
/// `[...]` comments are skipped and quoted labels lose their quotes.
pub fn from_newick(newick_string: &str) -> Result<Vec<Tree>> {
    info!("Parsing newick trees.");
    let mut pairs = match NewickParser::parse(Rule::newick, newick_string) {
        Ok(pairs) => pairs,
        Err(e) => bail!(ParsingError(Box::new(e))),
    };
    let Some(newick_rule) = pairs.next() else {
        bail!("Empty newick string");
    };
    let mut trees = Vec::new();
    for tree_rule in newick_rule.into_inner() {
        if tree_rule.as_rule() != Rule::tree {
            continue;
        }
        let Some(rooted_rule) = tree_rule.into_inner().next() else {
            continue;
        };
        let mut tree = Tree::new_empty();
        if let Err(e) = tree.parse_rooted_rule(rooted_rule) {
            bail!(ParsingError(e));
        }
        trees.push(tree);
    }
    info!("Finished parsing {} newick tree(s) successfully.", trees.len());
    Ok(trees)
}

impl Tree {
    fn new_empty() -> Self {
        Self {
            root: Int(0),
            nodes: Vec::new(),
            postorder: Vec::new(),
            preorder: Vec::new(),
            complete: false,
            n: 0,
            height: 0.0,
            leaf_ids: Vec::new(),
            dirty: FixedBitSet::new(),
        }
    }

    fn parse_rooted_rule(&mut self, rooted_rule: Pair<Rule>) -> stdResult<(), Box<PestError<Rule>>> {
        let Some(tree_rule) = rooted_rule.into_inner().next() else {
            return Ok(());
        };
        let mut node_idx = 0;
        match tree_rule.as_rule() {
            Rule::leaf => {
                self.parse_leaf_rule(&mut node_idx, tree_rule)?;
                self.root = Leaf(0);
            }
            Rule::internal => {
                self.parse_internal_rule(&mut node_idx, tree_rule)?;
                self.root = Int(0);
            }
            _ => unreachable!(),
        }
        self.complete();
        Ok(())
    }

    fn complete(&mut self) {
        self.n = self.nodes.iter().filter(|node| node.is_leaf()).count();
        self.compute_postorder();
        self.compute_preorder();
        self.compute_heights();
        self.leaf_ids = self
            .nodes
            .iter()
            .filter(|node| node.is_leaf())
            .map(|node| node.id.clone())
            .collect();
        self.dirty = FixedBitSet::with_capacity(self.nodes.len());
        self.complete = true;
    }

    fn parse_internal_rule(
        &mut self,
        node_idx: &mut usize,
        internal_rule: Pair<Rule>,
    ) -> stdResult<(), Box<PestError<Rule>>> {
        let span = internal_rule.as_span();
        let cur_node_idx = *node_idx;
        let mut id = String::from("");
        let mut blen = 0.0;
        let mut children = Vec::new();
        self.nodes.push(Node::new_empty_internal(cur_node_idx));
        *node_idx += 1;
        for rule in internal_rule.into_inner() {
            match rule.as_rule() {
                Rule::label => id = Tree::parse_label_rule(rule),
                Rule::branch_length => blen = Tree::parse_branch_length_rule(rule)?,
                Rule::internal => {
                    children.push(Int(*node_idx));
                    self.parse_internal_rule(node_idx, rule)?;
                }
                Rule::leaf => {
                    children.push(Leaf(*node_idx));
                    self.parse_leaf_rule(node_idx, rule)?;
                }
                _ => unreachable!(),
            }
        }
        if children.len() != 2 {
            return Err(Box::new(PestError::new_from_span(
                ErrorVariant::CustomError {
                    message: format!(
                        "Only binary trees are supported, found a node with {} children",
                        children.len()
                    ),
                },
                span,
            )));
        }
        for child_idx in &children {
            self.nodes[usize::from(child_idx)].parent = Some(Int(cur_node_idx));
        }
        let node = &mut self.nodes[cur_node_idx];
        node.id = id;
        node.blen = blen;
        node.children = children;
        Ok(())
    }

    fn parse_leaf_rule(
        &mut self,
        node_idx: &mut usize,
        leaf_rule: Pair<Rule>,
    ) -> stdResult<(), Box<PestError<Rule>>> {
        let mut id = String::from("");
        let mut blen = 0.0;
        for rule in leaf_rule.into_inner() {
            match rule.as_rule() {
                Rule::label => id = Tree::parse_label_rule(rule),
                Rule::branch_length => blen = Tree::parse_branch_length_rule(rule)?,
                _ => unreachable!(),
            }
        }
        self.nodes.push(Node::new_leaf(*node_idx, None, blen, id));
        *node_idx += 1;
        Ok(())
    }

    fn parse_branch_length_rule(rule: Pair<Rule>) -> stdResult<f64, Box<PestError<Rule>>> {
        let span = rule.as_span();
        let blen = rule
            .into_inner()
            .next()
            .map(|float| float.as_str().trim().parse::<f64>().unwrap_or(f64::NAN))
            .unwrap_or_default();
        if !blen.is_finite() || blen < 0.0 {
            return Err(Box::new(PestError::new_from_span(
                ErrorVariant::CustomError {
                    message: format!("Branch lengths must be non-negative, found {}", blen),
                },
                span,
            )));
        }
        Ok(blen)
    }

    fn parse_label_rule(rule: Pair<Rule>) -> String {
        let label = rule.as_str();
        let quoted = label.len() >= 2
            && ((label.starts_with('\'') && label.ends_with('\''))
                || (label.starts_with('"') && label.ends_with('"')));
        if quoted {
            label[1..label.len() - 1].to_string()
        } else {
            label.to_string()
        }
    }
}
