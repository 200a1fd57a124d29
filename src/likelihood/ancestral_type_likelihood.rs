use std::ptr;

use anyhow::bail;
use log::info;
use rand::Rng;

use crate::asr::{reconstruct_types, sample_types, PrunedPartials, SampledTypes, SamplingMode};
use crate::branch_rates::BranchRateModel;
use crate::likelihood::{
    direct_log_likelihood, minimum_switch_log_likelihood, JointLikelihood, RootContribution,
    Traversal,
};
use crate::substitution_models::TypeSubstModel;
use crate::tree::{NodeIdx, Tree};
use crate::type_info::TypeInfo;
use crate::{ConfigError, Result};

/// What a tree trait is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraitIntent {
    Node,
    Branch,
    Whole,
}

/// Named per-node values written into annotated trees.
pub trait TypeTrait {
    fn trait_name(&self) -> &str;
    fn intent(&self) -> TraitIntent;
    fn trait_for(&self, tree: &Tree, node_idx: &NodeIdx) -> Result<Vec<usize>>;
    fn trait_string(&self, tree: &Tree, node_idx: &NodeIdx) -> Result<String>;
}

/// Likelihood of the sampled node types on a fixed tree, with the last value kept for
/// rollback after a rejected proposal.
#[derive(Debug, Clone)]
pub struct AncestralTypeLikelihood<R: BranchRateModel> {
    info: TypeInfo,
    model: TypeSubstModel,
    rates: R,
    traversal: Traversal,
    root: RootContribution,
    tag: String,
    logp: f64,
    stored_logp: f64,
    joint: Option<JointLikelihood>,
}

impl<R: BranchRateModel> AncestralTypeLikelihood<R> {
    pub fn info(&self) -> &TypeInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut TypeInfo {
        &mut self.info
    }

    pub fn model(&self) -> &TypeSubstModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut TypeSubstModel {
        &mut self.model
    }

    pub fn rates(&self) -> &R {
        &self.rates
    }

    pub fn rates_mut(&mut self) -> &mut R {
        &mut self.rates
    }

    pub fn traversal(&self) -> Traversal {
        self.traversal
    }

    pub fn calculate_log_p(&mut self) -> Result<f64> {
        let joint = match self.traversal {
            Traversal::MinimumSwitch => {
                minimum_switch_log_likelihood(&self.info, &self.model, &self.rates, self.root)?
            }
            Traversal::Direct => {
                direct_log_likelihood(&self.info, &self.model, &self.rates, self.root)?
            }
        };
        self.logp = joint.logl;
        self.joint = Some(joint);
        Ok(self.logp)
    }

    /// Last computed log-likelihood.
    pub fn log_p(&self) -> f64 {
        self.logp
    }

    /// Per-branch trace of the last computation.
    pub fn joint(&self) -> Option<&JointLikelihood> {
        self.joint.as_ref()
    }

    pub fn store(&mut self) {
        self.stored_logp = self.logp;
        self.info.store();
        self.model.store();
        self.rates.store();
    }

    pub fn restore(&mut self) {
        self.logp = self.stored_logp;
        self.joint = None;
        self.info.restore();
        self.model.restore();
        self.rates.restore();
    }

    pub fn accept(&mut self) {
        self.info.accept();
        self.rates.accept();
        self.info.tree.clean();
    }

    pub fn requires_recalculation(&self) -> bool {
        true
    }

    /// Types of a node of the tree this likelihood was built on.
    pub fn states_for_node(&self, tree: &Tree, node_idx: &NodeIdx) -> Result<Vec<usize>> {
        if !ptr::eq(tree, &self.info.tree) {
            bail!(ConfigError::new(
                "Can only reconstruct types on the tree given to the likelihood"
            ));
        }
        let state = self
            .info
            .known_state(node_idx)
            .unwrap_or_else(|| self.info.node_type(node_idx));
        Ok(vec![state])
    }

    /// Types of every node, as reported in annotated trees.
    pub fn reconstructed_types(&self) -> Vec<usize> {
        reconstruct_types(&self.info)
    }

    /// Replaces the node types by a draw from the pruned partial likelihoods.
    pub fn redraw_types<G: Rng + ?Sized>(
        &mut self,
        rng: &mut G,
        mode: SamplingMode,
    ) -> Result<SampledTypes> {
        let partials = PrunedPartials::new(&self.info, &self.model, &self.rates)?;
        info!("Marginal type log-likelihood {}", partials.logl());
        sample_types(&mut self.info, &partials, self.model.freqs(), rng, mode)
    }

    /// The tree in newick format with the type of every node as a `[&tag="..."]` comment.
    pub fn annotated_newick(&self) -> String {
        let tree = &self.info.tree;
        tree.to_newick_annotated(|node_idx| {
            self.trait_string(tree, node_idx)
                .ok()
                .map(|value| format!("{}={}", self.tag, value))
        })
    }
}

impl<R: BranchRateModel> TypeTrait for AncestralTypeLikelihood<R> {
    fn trait_name(&self) -> &str {
        &self.tag
    }

    fn intent(&self) -> TraitIntent {
        TraitIntent::Node
    }

    fn trait_for(&self, tree: &Tree, node_idx: &NodeIdx) -> Result<Vec<usize>> {
        self.states_for_node(tree, node_idx)
    }

    fn trait_string(&self, tree: &Tree, node_idx: &NodeIdx) -> Result<String> {
        let states = self.states_for_node(tree, node_idx)?;
        Ok(format!("\"{}\"", self.info.alphabet.format_states(&states)))
    }
}

pub struct AncestralTypeLikelihoodBuilder<R: BranchRateModel> {
    info: TypeInfo,
    model: TypeSubstModel,
    rates: R,
    traversal: Traversal,
    root: Option<RootContribution>,
    tag: String,
    site_rate_categories: usize,
}

impl<R: BranchRateModel> AncestralTypeLikelihoodBuilder<R> {
    pub fn new(info: TypeInfo, model: TypeSubstModel, rates: R) -> Self {
        Self {
            info,
            model,
            rates,
            traversal: Traversal::MinimumSwitch,
            root: None,
            tag: String::from("type"),
            site_rate_categories: 1,
        }
    }

    pub fn traversal(mut self, traversal: Traversal) -> Self {
        self.traversal = traversal;
        self
    }

    /// Overrides the traversal's default treatment of the root type.
    pub fn root_contribution(mut self, root: RootContribution) -> Self {
        self.root = Some(root);
        self
    }

    /// Name of the node annotation in written trees.
    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }

    /// Number of site rate categories of the site model the types evolve under.
    pub fn site_rate_categories(mut self, categories: usize) -> Self {
        self.site_rate_categories = categories;
        self
    }

    /// Bails unless the types form a single pattern under a single site rate category.
    /// Bails if the model and the alphabet disagree on the number of types, or if the
    /// minimum switch traversal is used with other than two types.
    pub fn build(self) -> Result<AncestralTypeLikelihood<R>> {
        let patterns = self.info.pattern_count();
        if patterns != 1 {
            bail!(ConfigError::new(format!(
                "Type reconstruction needs exactly one site pattern, got {}",
                patterns
            )));
        }
        if self.site_rate_categories != 1 {
            bail!(ConfigError::new(format!(
                "Type reconstruction is not implemented for {} site rate categories",
                self.site_rate_categories
            )));
        }
        if self.model.n() != self.info.state_count() {
            bail!(ConfigError::new(format!(
                "Substitution model has {} types but the alphabet has {}",
                self.model.n(),
                self.info.state_count()
            )));
        }
        if self.traversal == Traversal::MinimumSwitch && self.model.n() != 2 {
            bail!(ConfigError::new(format!(
                "The minimum switch likelihood needs two types, got {}",
                self.model.n()
            )));
        }
        let root = self.root.unwrap_or(self.traversal.default_root());
        info!(
            "Set up the {} type likelihood, annotating trees with '{}'",
            self.traversal, self.tag
        );
        Ok(AncestralTypeLikelihood {
            info: self.info,
            model: self.model,
            rates: self.rates,
            traversal: self.traversal,
            root,
            tag: self.tag,
            logp: 0.0,
            stored_logp: 0.0,
            joint: None,
        })
    }
}
