use anyhow::bail;
use log::{debug, info};
use rand::Rng;

use crate::branch_rates::BranchRateModel;
use crate::substitution_models::{FreqVector, SubstMatrix, TypeSubstModel};
use crate::tree::NodeIdx;
use crate::type_info::{default_occupancy, TypeInfo};
use crate::{ConfigError, Result};

/// Per-node partial likelihoods of the types below each node and the transition
/// probabilities of the branch above it, as computed by a pruning likelihood engine.
pub trait PartialsProvider {
    fn node_count(&self) -> usize;
    fn partials(&self, node_idx: &NodeIdx) -> &FreqVector;
    /// Transition probabilities of the branch above the node, rows being the parent type.
    fn transition_probabilities(&self, node_idx: &NodeIdx) -> &SubstMatrix;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Draw every type proportionally to its weight.
    Sample,
    /// Take the most likely type at every node.
    Map,
}

/// Types drawn for every node and the log-probability of drawing them.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTypes {
    pub states: Vec<usize>,
    pub log_density: f64,
}

/// Partial likelihoods from Felsenstein pruning over the current branch rates. Partials
/// are rescaled at every node, the scaling factors being kept in the marginal
/// log-likelihood.
#[derive(Debug, Clone)]
pub struct PrunedPartials {
    partials: Vec<FreqVector>,
    transitions: Vec<SubstMatrix>,
    logl: f64,
}

impl PrunedPartials {
    pub fn new<R: BranchRateModel + ?Sized>(
        info: &TypeInfo,
        model: &TypeSubstModel,
        rates: &R,
    ) -> Result<Self> {
        let tree = &info.tree;
        let n = model.n();
        if n != info.state_count() {
            bail!(ConfigError::new(format!(
                "Model has {} types but the alphabet has {}",
                n,
                info.state_count()
            )));
        }
        let mut partials = vec![FreqVector::zeros(n); tree.len()];
        let mut transitions = vec![SubstMatrix::identity(n, n); tree.len()];
        let mut log_scale = 0.0;
        for node_idx in &tree.postorder {
            let idx = usize::from(node_idx);
            if let Some(parent) = tree.parent(node_idx) {
                let rate = rates.rate_for_branch(info, model, node_idx)?;
                transitions[idx] =
                    model.transition_probabilities(tree.height(parent), tree.height(node_idx), rate);
            }
            let mut partial = match info.observation(node_idx) {
                Some(obs) => {
                    let mut leaf = FreqVector::zeros(n);
                    for state in obs.allowed_states() {
                        leaf[*state] = 1.0;
                    }
                    leaf
                }
                None if tree.children(node_idx).is_empty() => FreqVector::from_element(n, 1.0),
                None => {
                    let mut internal = FreqVector::from_element(n, 1.0);
                    for child in tree.children(node_idx) {
                        let c = usize::from(child);
                        internal.component_mul_assign(&(&transitions[c] * &partials[c]));
                    }
                    internal
                }
            };
            let scale = partial.max();
            if scale > 0.0 {
                partial /= scale;
                log_scale += scale.ln();
            }
            partials[idx] = partial;
        }
        let root = usize::from(&tree.root);
        let logl = partials[root].dot(model.freqs()).ln() + log_scale;
        debug!("Marginal type log-likelihood: {}", logl);
        Ok(Self {
            partials,
            transitions,
            logl,
        })
    }

    /// Log-likelihood of the leaf observations with all other types summed out.
    pub fn logl(&self) -> f64 {
        self.logl
    }
}

impl PartialsProvider for PrunedPartials {
    fn node_count(&self) -> usize {
        self.partials.len()
    }

    fn partials(&self, node_idx: &NodeIdx) -> &FreqVector {
        &self.partials[usize::from(node_idx)]
    }

    fn transition_probabilities(&self, node_idx: &NodeIdx) -> &SubstMatrix {
        &self.transitions[usize::from(node_idx)]
    }
}

/// Types to report for every node: the observed type of unambiguous leaves, the sampled
/// node type everywhere else.
pub fn reconstruct_types(info: &TypeInfo) -> Vec<usize> {
    info.tree
        .iter()
        .map(|node| {
            info.known_state(&node.idx)
                .unwrap_or_else(|| info.node_type(&node.idx))
        })
        .collect()
}

/// Draws a type for every node in preorder, each conditioned on the type drawn for its
/// parent, and writes them into the node types of `info`. Branches whose end types
/// changed get the default occupancy of their new end types.
///
/// The root is weighted by `partials * freqs`, every other node by
/// `partials * P[parent type]`.
pub fn sample_types<P, G>(
    info: &mut TypeInfo,
    partials: &P,
    freqs: &FreqVector,
    rng: &mut G,
    mode: SamplingMode,
) -> Result<SampledTypes>
where
    P: PartialsProvider + ?Sized,
    G: Rng + ?Sized,
{
    if partials.node_count() != info.tree.len() {
        bail!(ConfigError::new(format!(
            "Partials are given for {} nodes but the tree has {}",
            partials.node_count(),
            info.tree.len()
        )));
    }
    if freqs.len() != info.state_count() {
        bail!(ConfigError::new(format!(
            "Expected {} root frequencies, got {}",
            info.state_count(),
            freqs.len()
        )));
    }
    let mut states = vec![0; info.tree.len()];
    let mut log_density = 0.0;
    for node_idx in &info.tree.preorder {
        let weights = match info.tree.parent(node_idx) {
            None => partials.partials(node_idx).component_mul(freqs),
            Some(parent) => {
                let row = partials
                    .transition_probabilities(node_idx)
                    .row(states[usize::from(parent)])
                    .transpose();
                partials.partials(node_idx).component_mul(&row)
            }
        };
        let total = weights.sum();
        if !(total > 0.0) || !total.is_finite() {
            bail!(
                "Types of node {} have total weight {}, cannot draw a type",
                info.tree.node_id(node_idx),
                total
            );
        }
        let state = match mode {
            SamplingMode::Map => weights.argmax().0,
            SamplingMode::Sample => draw(&weights, total, rng),
        };
        log_density += (weights[state] / total).ln();
        states[usize::from(node_idx)] = state;
    }
    reset_switched_occupancies(info, &states)?;
    for (i, state) in states.iter().enumerate() {
        info.node_types.set_value(i, *state)?;
    }
    let root = info.tree.root;
    info.tree.mark_subtree_dirty(&root);
    info!("Redrew node types, log density of the draw {}", log_density);
    Ok(SampledTypes {
        states,
        log_density,
    })
}

/// Branches with a redrawn end type restart from the default occupancy of their new end
/// types, other branches keep theirs.
fn reset_switched_occupancies(info: &mut TypeInfo, states: &[usize]) -> Result<()> {
    let previous = info.node_types.values().to_vec();
    let resets: Vec<(usize, f64)> = info
        .tree
        .iter()
        .filter_map(|node| {
            let i = usize::from(node.idx);
            let p = node.parent.map_or(i, usize::from);
            (states[i] != previous[i] || states[p] != previous[p])
                .then(|| (i, default_occupancy(states[p], states[i])))
        })
        .collect();
    debug!("Resetting the occupancy of {} branch(es)", resets.len());
    for (i, occupancy) in resets {
        info.occupancy.set_value(i, occupancy)?;
    }
    Ok(())
}

fn draw<G: Rng + ?Sized>(weights: &FreqVector, total: f64, rng: &mut G) -> usize {
    let u = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if u < cumulative && *w > 0.0 {
            return i;
        }
    }
    // rounding can leave u just above the last cumulative sum
    weights
        .iter()
        .rposition(|w| *w > 0.0)
        .unwrap_or(weights.len() - 1)
}

#[cfg(test)]
mod tests;
