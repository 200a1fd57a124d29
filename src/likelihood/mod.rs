use std::fmt::{self, Display};

use anyhow::bail;
use log::debug;

use crate::branch_rates::BranchRateModel;
use crate::occupancy::OccupancyError;
use crate::substitution_models::TypeSubstModel;
use crate::tree::NodeIdx;
use crate::type_info::TypeInfo;
use crate::Result;

mod ancestral_type_likelihood;
pub use ancestral_type_likelihood::*;

/// Smallest number of type switches a branch needs given the types at its ends and the
/// fraction of it spent in type 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinimumSwitches {
    Zero,
    One,
    Two,
}

impl MinimumSwitches {
    /// A branch whose ends differ switched once. A branch whose ends agree either stayed
    /// in its type, which requires an occupancy of exactly 0 or 1, or left it and came back.
    pub fn classify(parent_type: usize, child_type: usize, occupancy: f64) -> Self {
        if parent_type != child_type {
            MinimumSwitches::One
        } else if occupancy == 0.0 || occupancy == 1.0 {
            MinimumSwitches::Zero
        } else {
            MinimumSwitches::Two
        }
    }
}

impl Display for MinimumSwitches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinimumSwitches::Zero => write!(f, "0 switches"),
            MinimumSwitches::One => write!(f, "1 switch"),
            MinimumSwitches::Two => write!(f, "2 switches"),
        }
    }
}

/// How the type at the root enters the joint likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootContribution {
    Ignore,
    Frequencies,
}

/// Which per-branch probability the joint likelihood is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Splits each branch by its occupancy into 0, 1 or 2 type switches.
    MinimumSwitch,
    /// Transition probability between the end types over the whole branch.
    Direct,
}

impl Traversal {
    pub fn default_root(&self) -> RootContribution {
        match self {
            Traversal::MinimumSwitch => RootContribution::Ignore,
            Traversal::Direct => RootContribution::Frequencies,
        }
    }
}

impl Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Traversal::MinimumSwitch => write!(f, "minimum switch"),
            Traversal::Direct => write!(f, "direct transition"),
        }
    }
}

/// Score of the branch above one node.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchContribution {
    pub node: NodeIdx,
    pub parent_type: usize,
    pub child_type: usize,
    /// `None` for the direct transition traversal.
    pub switches: Option<MinimumSwitches>,
    /// `None` if the rate model finds the branch impossible.
    pub rate: Option<f64>,
    pub probability: f64,
    pub logl: f64,
}

/// Joint log-likelihood of all node types together with the per-branch trace, branches
/// listed in preorder.
#[derive(Debug, Clone, PartialEq)]
pub struct JointLikelihood {
    pub logl: f64,
    pub root_logl: f64,
    pub branches: Vec<BranchContribution>,
}

impl JointLikelihood {
    pub fn branch(&self, node_idx: &NodeIdx) -> Option<&BranchContribution> {
        self.branches.iter().find(|b| b.node == *node_idx)
    }
}

/// Type used for a node and whether it is allowed by the leaf observation.
fn scored_type(info: &TypeInfo, node_idx: &NodeIdx) -> Result<(usize, bool)> {
    let assigned = info.node_type(node_idx);
    let Some(obs) = info.observation(node_idx) else {
        return Ok((assigned, true));
    };
    match obs.known_state() {
        Some(known) if known != assigned => bail!(
            "Leaf {} is observed as {} but has type {}",
            info.tree.node_id(node_idx),
            obs.code(),
            assigned
        ),
        Some(known) => Ok((known, true)),
        None => Ok((assigned, obs.allowed_states().contains(&assigned))),
    }
}

fn root_log_likelihood(
    info: &TypeInfo,
    model: &TypeSubstModel,
    root: RootContribution,
) -> Result<f64> {
    match root {
        RootContribution::Ignore => Ok(0.0),
        RootContribution::Frequencies => {
            let (root_type, allowed) = scored_type(info, &info.tree.root)?;
            check_type(model, info, &info.tree.root, root_type)?;
            if !allowed {
                return Ok(f64::NEG_INFINITY);
            }
            Ok(model.freqs()[root_type].ln())
        }
    }
}

/// Branch rate, or `None` if the rate model finds the branch impossible.
fn branch_rate<R: BranchRateModel + ?Sized>(
    info: &TypeInfo,
    model: &TypeSubstModel,
    rates: &R,
    node_idx: &NodeIdx,
) -> Result<Option<f64>> {
    match rates.rate_for_branch(info, model, node_idx) {
        Ok(rate) => Ok(Some(rate)),
        Err(e) => match e.downcast_ref::<OccupancyError>() {
            Some(OccupancyError::ForbiddenTransition { .. }) => {
                debug!("Branch above {} is impossible: {}", node_idx, e);
                Ok(None)
            }
            _ => Err(e),
        },
    }
}

fn check_type(model: &TypeSubstModel, info: &TypeInfo, node_idx: &NodeIdx, t: usize) -> Result<()> {
    if t >= model.n() {
        bail!(
            "Node {} has type {} but the model only has {} types",
            info.tree.node_id(node_idx),
            t,
            model.n()
        );
    }
    Ok(())
}

/// Joint log-likelihood of the node types and occupancies under the minimum switch
/// decomposition.
///
/// Every non-root branch of length `dh` and occupancy `occ` scores
/// * no switch: `P(dh)[p][c]`;
/// * one switch: the time in type 1 is `dh * occ`, the rest is spent in type 0, and the
///   branch scores `P(t_parent)[p][p] * P(t_child)[c][c]`;
/// * two switches: the time outside the end type is split into two halves `tx`, and the
///   branch scores `P(tx)[0][1] * P(tx)[1][0] * P(dh * occ)[o][o]` with `o` the type not
///   at the ends. If any switch rate is zero this is impossible.
///
/// All probabilities use the rate of the branch. A zero probability gives `-inf`, which
/// is a valid result. Types outside an ambiguous leaf's allowed set score zero.
pub fn minimum_switch_log_likelihood<R: BranchRateModel + ?Sized>(
    info: &TypeInfo,
    model: &TypeSubstModel,
    rates: &R,
    root: RootContribution,
) -> Result<JointLikelihood> {
    if model.n() != 2 {
        bail!(
            "The minimum switch likelihood needs two types, the model has {}",
            model.n()
        );
    }
    let tree = &info.tree;
    let root_logl = root_log_likelihood(info, model, root)?;
    let mut branches = Vec::with_capacity(tree.len().saturating_sub(1));
    for node_idx in &tree.preorder {
        let Some(parent) = tree.parent(node_idx) else {
            continue;
        };
        let (parent_type, _) = scored_type(info, parent)?;
        let (child_type, allowed) = scored_type(info, node_idx)?;
        check_type(model, info, parent, parent_type)?;
        check_type(model, info, node_idx, child_type)?;
        let occupancy = info.node_occupancy(node_idx);
        if !(0.0..=1.0).contains(&occupancy) {
            bail!(
                "Occupancy {} of the branch above {} is outside [0, 1]",
                occupancy,
                tree.node_id(node_idx)
            );
        }
        let switches = MinimumSwitches::classify(parent_type, child_type, occupancy);
        let rate = branch_rate(info, model, rates, node_idx)?;

        let probability = match rate {
            Some(rate) if allowed => {
                let parent_height = tree.height(parent);
                let height = tree.height(node_idx);
                let dh = parent_height - height;
                match switches {
                    MinimumSwitches::Zero => {
                        model.transition_probabilities(parent_height, height, rate)
                            [(parent_type, child_type)]
                    }
                    MinimumSwitches::One => {
                        let time_in_one = dh * occupancy;
                        let time_in_zero = dh - time_in_one;
                        let (t_parent, t_child) = if parent_type == 0 {
                            (time_in_zero, time_in_one)
                        } else {
                            (time_in_one, time_in_zero)
                        };
                        model.transition_probabilities(t_parent, 0.0, rate)
                            [(parent_type, parent_type)]
                            * model.transition_probabilities(t_child, 0.0, rate)
                                [(child_type, child_type)]
                    }
                    MinimumSwitches::Two if model.has_forbidden_transition() => 0.0,
                    MinimumSwitches::Two => {
                        let t_switch = dh * (1.0 - occupancy) / 2.0;
                        let other = 1 - child_type;
                        let p_switch = model.transition_probabilities(t_switch, 0.0, rate);
                        p_switch[(0, 1)]
                            * p_switch[(1, 0)]
                            * model.transition_probabilities(dh * occupancy, 0.0, rate)
                                [(other, other)]
                    }
                }
            }
            _ => 0.0,
        };
        let probability = checked_probability(info, node_idx, probability)?;
        branches.push(BranchContribution {
            node: *node_idx,
            parent_type,
            child_type,
            switches: Some(switches),
            rate,
            probability,
            logl: probability.ln(),
        });
    }
    finish(root_logl, branches)
}

/// Joint log-likelihood of the node types with every branch scored by the transition
/// probability between its end types over the whole branch.
pub fn direct_log_likelihood<R: BranchRateModel + ?Sized>(
    info: &TypeInfo,
    model: &TypeSubstModel,
    rates: &R,
    root: RootContribution,
) -> Result<JointLikelihood> {
    let tree = &info.tree;
    let root_logl = root_log_likelihood(info, model, root)?;
    let mut branches = Vec::with_capacity(tree.len().saturating_sub(1));
    for node_idx in &tree.preorder {
        let Some(parent) = tree.parent(node_idx) else {
            continue;
        };
        let (parent_type, _) = scored_type(info, parent)?;
        let (child_type, allowed) = scored_type(info, node_idx)?;
        check_type(model, info, parent, parent_type)?;
        check_type(model, info, node_idx, child_type)?;
        let rate = branch_rate(info, model, rates, node_idx)?;
        let probability = match rate {
            Some(rate) if allowed => {
                model.transition_probabilities(tree.height(parent), tree.height(node_idx), rate)
                    [(parent_type, child_type)]
            }
            _ => 0.0,
        };
        let probability = checked_probability(info, node_idx, probability)?;
        branches.push(BranchContribution {
            node: *node_idx,
            parent_type,
            child_type,
            switches: None,
            rate,
            probability,
            logl: probability.ln(),
        });
    }
    finish(root_logl, branches)
}

/// Rounding can leave a probability slightly below zero, a NaN means the branch could
/// not be evaluated.
fn checked_probability(info: &TypeInfo, node_idx: &NodeIdx, probability: f64) -> Result<f64> {
    if probability.is_nan() {
        bail!(
            "Probability of the branch above {} is not a number",
            info.tree.node_id(node_idx)
        );
    }
    Ok(probability.max(0.0))
}

fn finish(root_logl: f64, branches: Vec<BranchContribution>) -> Result<JointLikelihood> {
    let logl = root_logl + branches.iter().map(|b| b.logl).sum::<f64>();
    if logl.is_nan() {
        bail!("Joint type log-likelihood is NaN");
    }
    debug!("Joint type log-likelihood: {}", logl);
    Ok(JointLikelihood {
        logl,
        root_logl,
        branches,
    })
}
