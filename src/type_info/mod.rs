use crate::alphabets::TypeAlphabet;
use crate::parameters::{IntegerParameter, RealParameter};
use crate::tree::{NodeIdx, Tree};

mod type_info_builder;
pub use type_info_builder::*;

/// Observed type codes of one leaf, one code per site, together with the states each
/// code allows.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafObservation {
    pub codes: Vec<String>,
    pub allowed: Vec<Vec<usize>>,
}

impl LeafObservation {
    pub fn code(&self) -> &str {
        &self.codes[0]
    }

    pub fn allowed_states(&self) -> &[usize] {
        &self.allowed[0]
    }

    pub fn known_state(&self) -> Option<usize> {
        match self.allowed[0].as_slice() {
            [state] => Some(*state),
            _ => None,
        }
    }
}

/// Everything the type process is conditioned on: the tree, the type alphabet, the leaf
/// observations and the sampled per-node mappings.
///
/// `node_types` holds one state per node (known leaves carry their observed state);
/// `occupancy` holds, per node, the fraction of the branch above it spent in type 1.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub tree: Tree,
    pub alphabet: TypeAlphabet,
    pub node_types: IntegerParameter,
    pub occupancy: RealParameter,
    pub(crate) observations: Vec<Option<LeafObservation>>,
}

impl TypeInfo {
    pub fn state_count(&self) -> usize {
        self.alphabet.state_count()
    }

    /// Number of observed sites per leaf.
    pub fn site_count(&self) -> usize {
        self.observations
            .iter()
            .flatten()
            .map(|obs| obs.codes.len())
            .next()
            .unwrap_or(0)
    }

    /// Number of distinct site patterns across the leaves.
    pub fn pattern_count(&self) -> usize {
        let leaves: Vec<&LeafObservation> = self.observations.iter().flatten().collect();
        let mut patterns: Vec<Vec<&str>> = (0..self.site_count())
            .map(|site| leaves.iter().map(|obs| obs.codes[site].as_str()).collect())
            .collect();
        patterns.sort();
        patterns.dedup();
        patterns.len()
    }

    pub fn observation(&self, node_idx: &NodeIdx) -> Option<&LeafObservation> {
        self.observations[usize::from(node_idx)].as_ref()
    }

    /// Observed state of a leaf with an unambiguous code.
    pub fn known_state(&self, node_idx: &NodeIdx) -> Option<usize> {
        self.observation(node_idx).and_then(LeafObservation::known_state)
    }

    pub fn is_ambiguous_leaf(&self, node_idx: &NodeIdx) -> bool {
        self.observation(node_idx)
            .is_some_and(|obs| obs.known_state().is_none())
    }

    pub fn node_type(&self, node_idx: &NodeIdx) -> usize {
        self.node_types.value(usize::from(node_idx))
    }

    pub fn node_occupancy(&self, node_idx: &NodeIdx) -> f64 {
        self.occupancy.value(usize::from(node_idx))
    }

    pub fn store(&mut self) {
        self.node_types.store();
        self.occupancy.store();
    }

    pub fn restore(&mut self) {
        self.node_types.restore();
        self.occupancy.restore();
    }

    pub fn accept(&mut self) {
        self.node_types.accept();
        self.occupancy.accept();
    }
}

/// Default occupancy of the branch above a node given the types at its ends: a branch
/// that never leaves type 0 or type 1 spends all of its time there, a switching branch
/// starts halfway.
pub fn default_occupancy(parent_type: usize, child_type: usize) -> f64 {
    match (parent_type, child_type) {
        (p, c) if p != c => 0.5,
        (_, 1) => 1.0,
        _ => 0.0,
    }
}
