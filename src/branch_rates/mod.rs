use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::{self, Display};

use anyhow::bail;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::occupancy::expected_occupancy;
use crate::parameters::{IntegerParameter, RealParameter};
use crate::substitution_models::TypeSubstModel;
use crate::tree::{NodeIdx, Tree};
use crate::type_info::TypeInfo;
use crate::{ConfigError, Result};

/// Substitution rate of the branch above a node. The root has no branch and always
/// gets a rate of 1.
pub trait BranchRateModel {
    fn rate_for_branch(
        &self,
        info: &TypeInfo,
        model: &TypeSubstModel,
        node_idx: &NodeIdx,
    ) -> Result<f64>;
    fn store(&mut self) {}
    fn restore(&mut self) {}
    fn accept(&mut self) {}
    fn requires_recalculation(&self) -> bool {
        true
    }
}

/// One rate for every branch.
#[derive(Debug, Clone, PartialEq)]
pub struct StrictClock {
    rate: f64,
}

impl StrictClock {
    pub fn new(rate: f64) -> Result<Self> {
        if !rate.is_finite() || rate < 0.0 {
            bail!(ConfigError::new(format!(
                "Clock rate must be finite and non-negative, got {}",
                rate
            )));
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl BranchRateModel for StrictClock {
    fn rate_for_branch(
        &self,
        info: &TypeInfo,
        _model: &TypeSubstModel,
        node_idx: &NodeIdx,
    ) -> Result<f64> {
        if info.tree.is_root(node_idx) {
            return Ok(1.0);
        }
        Ok(self.rate)
    }
}

/// How the rates of the types at both ends of a branch combine into the branch rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockPolicy {
    /// The branch evolves at the rate of the type at its younger end.
    InstantSwitch,
    /// Type rates weighted by the expected time spent in each type, the type process
    /// running for `blen * type_clock_rate`.
    ExpectedOccupancy { type_clock_rate: f64 },
    /// Instant switch on branches that keep their type, expected occupancy otherwise.
    MixedSwitch { type_clock_rate: f64 },
    /// Type rates weighted by the sampled occupancy of the branch.
    OccupancyLinked,
}

impl ClockPolicy {
    fn type_clock_rate(&self) -> Option<f64> {
        match self {
            ClockPolicy::ExpectedOccupancy { type_clock_rate }
            | ClockPolicy::MixedSwitch { type_clock_rate } => Some(*type_clock_rate),
            ClockPolicy::InstantSwitch | ClockPolicy::OccupancyLinked => None,
        }
    }

    fn needs_two_types(&self) -> bool {
        !matches!(self, ClockPolicy::InstantSwitch)
    }
}

impl Display for ClockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockPolicy::InstantSwitch => write!(f, "instant switch"),
            ClockPolicy::ExpectedOccupancy { type_clock_rate } => {
                write!(f, "expected occupancy (type clock rate {})", type_clock_rate)
            }
            ClockPolicy::MixedSwitch { type_clock_rate } => {
                write!(f, "mixed switch (type clock rate {})", type_clock_rate)
            }
            ClockPolicy::OccupancyLinked => write!(f, "occupancy linked"),
        }
    }
}

/// Per-branch rate categories of a relaxed type-linked clock. Every branch carries one
/// category per type; the assignment of type `t` on branch `b` lives at
/// `t * branch_count + b`, branches being numbered in node order with the root skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RateCategories {
    per_type: usize,
    branch_count: usize,
    branch_slots: Vec<Option<usize>>,
    assignments: IntegerParameter,
}

impl RateCategories {
    fn new(tree: &Tree, per_type: usize, type_count: usize, assignments: Vec<usize>) -> Result<Self> {
        let branch_count = tree.len() - 1;
        if assignments.len() != branch_count * type_count {
            bail!(ConfigError::new(format!(
                "Rate category dimension {} does not match {} branches x {} types",
                assignments.len(),
                branch_count,
                type_count
            )));
        }
        let root = usize::from(&tree.root);
        let branch_slots = (0..tree.len())
            .map(|i| match i.cmp(&root) {
                Ordering::Less => Some(i),
                Ordering::Equal => None,
                Ordering::Greater => Some(i - 1),
            })
            .collect();
        Ok(Self {
            per_type,
            branch_count,
            branch_slots,
            assignments: IntegerParameter::new("rateCategories", &assignments, 0, per_type - 1)?,
        })
    }

    pub fn categories_per_type(&self) -> usize {
        self.per_type
    }

    pub fn assignments(&self) -> &IntegerParameter {
        &self.assignments
    }

    fn index(&self, node_idx: &NodeIdx, type_: usize) -> Option<usize> {
        self.branch_slots[usize::from(node_idx)].map(|slot| type_ * self.branch_count + slot)
    }

    /// Category of the given type on the branch above a non-root node.
    pub fn category(&self, node_idx: &NodeIdx, type_: usize) -> usize {
        self.index(node_idx, type_)
            .map_or(0, |i| self.assignments.value(i))
    }

    pub fn set_category(&mut self, node_idx: &NodeIdx, type_: usize, category: usize) -> Result<()> {
        let Some(i) = self.index(node_idx, type_) else {
            bail!("The root has no branch to assign a rate category to");
        };
        self.assignments.set_value(i, category)
    }
}

/// Branch rates linked to the types at the ends of each branch.
#[derive(Debug, Clone)]
pub struct TypeLinkedClock {
    policy: ClockPolicy,
    type_rates: RealParameter,
    categories: Option<RateCategories>,
    rate_log: Option<RefCell<RealParameter>>,
    occupancy_log: Option<RefCell<RealParameter>>,
}

impl TypeLinkedClock {
    pub fn policy(&self) -> ClockPolicy {
        self.policy
    }

    pub fn type_rates(&self) -> &RealParameter {
        &self.type_rates
    }

    pub fn set_type_rate(&mut self, i: usize, rate: f64) -> Result<()> {
        self.type_rates.set_value(i, rate)
    }

    pub fn categories(&self) -> Option<&RateCategories> {
        self.categories.as_ref()
    }

    pub fn categories_mut(&mut self) -> Option<&mut RateCategories> {
        self.categories.as_mut()
    }

    /// Last rate computed for every branch, if rate logging is on.
    pub fn logged_rates(&self) -> Option<Vec<f64>> {
        self.rate_log.as_ref().map(|log| log.borrow().values().to_vec())
    }

    /// Last expected time fraction in type 0 computed for every branch, if occupancy
    /// logging is on.
    pub fn logged_occupancies(&self) -> Option<Vec<f64>> {
        self.occupancy_log
            .as_ref()
            .map(|log| log.borrow().values().to_vec())
    }

    fn type_rate(&self, node_idx: &NodeIdx, type_: usize) -> f64 {
        match &self.categories {
            None => self.type_rates.value(type_),
            Some(cats) => self
                .type_rates
                .value(type_ * cats.per_type + cats.category(node_idx, type_)),
        }
    }

    fn occupancy_weighted_rate(
        &self,
        info: &TypeInfo,
        model: &TypeSubstModel,
        node_idx: &NodeIdx,
        parent_type: usize,
        type_clock_rate: f64,
    ) -> Result<f64> {
        let type_time = info.tree.blen(node_idx) * type_clock_rate;
        let [p0, p1] =
            expected_occupancy(parent_type, info.node_type(node_idx), type_time, model.q())?;
        if let Some(log) = &self.occupancy_log {
            log.borrow_mut().set_value(usize::from(node_idx), p0)?;
        }
        Ok(self.type_rate(node_idx, 0) * p0 + self.type_rate(node_idx, 1) * p1)
    }

    fn record_rate(&self, node_idx: &NodeIdx, rate: f64) -> Result<f64> {
        if let Some(log) = &self.rate_log {
            log.borrow_mut().set_value(usize::from(node_idx), rate)?;
        }
        Ok(rate)
    }
}

impl BranchRateModel for TypeLinkedClock {
    fn rate_for_branch(
        &self,
        info: &TypeInfo,
        model: &TypeSubstModel,
        node_idx: &NodeIdx,
    ) -> Result<f64> {
        let Some(parent) = info.tree.parent(node_idx) else {
            return self.record_rate(node_idx, 1.0);
        };
        let child_type = info.node_type(node_idx);
        let parent_type = info.node_type(parent);
        let rate = match self.policy {
            ClockPolicy::InstantSwitch => self.type_rate(node_idx, child_type),
            ClockPolicy::MixedSwitch { .. } if parent_type == child_type => {
                self.type_rate(node_idx, child_type)
            }
            ClockPolicy::ExpectedOccupancy { type_clock_rate }
            | ClockPolicy::MixedSwitch { type_clock_rate } => self.occupancy_weighted_rate(
                info,
                model,
                node_idx,
                parent_type,
                type_clock_rate,
            )?,
            ClockPolicy::OccupancyLinked => {
                let occ = info.node_occupancy(node_idx);
                (1.0 - occ) * self.type_rate(node_idx, 0) + occ * self.type_rate(node_idx, 1)
            }
        };
        debug!("Branch above {} has rate {}", node_idx, rate);
        self.record_rate(node_idx, rate)
    }

    fn store(&mut self) {
        self.type_rates.store();
        if let Some(cats) = &mut self.categories {
            cats.assignments.store();
        }
    }

    fn restore(&mut self) {
        self.type_rates.restore();
        if let Some(cats) = &mut self.categories {
            cats.assignments.restore();
        }
    }

    fn accept(&mut self) {
        self.type_rates.accept();
        if let Some(cats) = &mut self.categories {
            cats.assignments.accept();
        }
    }
}

pub struct TypeLinkedClockBuilder {
    policy: ClockPolicy,
    type_rates: Vec<f64>,
    categories_per_type: usize,
    assignments: Option<Vec<usize>>,
    seed: Option<u64>,
    log_rates: bool,
    log_occupancies: bool,
}

impl TypeLinkedClockBuilder {
    /// Starts a strict type-linked clock with one rate per type.
    ///
    /// # Example
    /// ```
    /// use tyche::binary_info;
    /// use tyche::branch_rates::{BranchRateModel, ClockPolicy, TypeLinkedClockBuilder};
    /// use tyche::substitution_models::TypeSubstModel;
    /// use tyche::tree::NodeIdx::Leaf;
    ///
    /// let info = binary_info!("((A:1,B:1)I1:1,C:2)R;", "A=0,B=0,C=1");
    /// let model = TypeSubstModel::two_state(0.5, 0.3).unwrap();
    /// let clock = TypeLinkedClockBuilder::new(ClockPolicy::InstantSwitch, &[1.0, 3.0])
    ///     .build(&info, Some(&model))
    ///     .unwrap();
    /// assert_eq!(clock.rate_for_branch(&info, &model, &Leaf(4)).unwrap(), 3.0);
    /// ```
    pub fn new(policy: ClockPolicy, type_rates: &[f64]) -> Self {
        Self {
            policy,
            type_rates: type_rates.to_vec(),
            categories_per_type: 1,
            assignments: None,
            seed: None,
            log_rates: false,
            log_occupancies: false,
        }
    }

    /// Makes the clock relaxed with the given number of rate categories per type. The
    /// type rates are then expected as `type * categories_per_type + category`.
    pub fn categories_per_type(mut self, categories_per_type: usize) -> Self {
        self.categories_per_type = categories_per_type;
        self
    }

    /// Initial rate categories, laid out type by type. Drawn uniformly when not given.
    pub fn category_assignments(mut self, assignments: Vec<usize>) -> Self {
        self.assignments = Some(assignments);
        self
    }

    /// Seed for drawing the initial rate categories.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn log_rates(mut self) -> Self {
        self.log_rates = true;
        self
    }

    pub fn log_occupancies(mut self) -> Self {
        self.log_occupancies = true;
        self
    }

    /// Builds the clock for the given type info.
    /// Bails if the number of type rates is not (highest type + 1) x categories per type.
    /// Bails if an occupancy based policy is used with types other than 0 and 1.
    /// Bails if an expected occupancy policy has no two-state model or an invalid type
    /// clock rate.
    pub fn build(self, info: &TypeInfo, model: Option<&TypeSubstModel>) -> Result<TypeLinkedClock> {
        let bounds = (info.node_types.lower(), info.node_types.upper());
        let type_count = bounds.1 - bounds.0 + 1;
        if self.categories_per_type == 0 {
            bail!(ConfigError::new("At least one rate category per type is required"));
        }
        let expected = type_count * self.categories_per_type;
        if self.type_rates.len() != expected {
            bail!(ConfigError::new(format!(
                "Dimension of type rates ({}) should equal the number of types times the \
                 categories per type ({})",
                self.type_rates.len(),
                expected
            )));
        }
        if self.policy.needs_two_types() && bounds != (0, 1) {
            bail!(ConfigError::new(format!(
                "The {} clock needs node types bounded by [0, 1], got [{}, {}]",
                self.policy, bounds.0, bounds.1
            )));
        }
        if let Some(type_clock_rate) = self.policy.type_clock_rate() {
            match model {
                Some(model) if model.n() == 2 => {}
                Some(model) => bail!(ConfigError::new(format!(
                    "Expected occupancy needs a two-state rate matrix, got {} states",
                    model.n()
                ))),
                None => bail!(ConfigError::new(
                    "Expected occupancy needs a type substitution model"
                )),
            }
            if !type_clock_rate.is_finite() || type_clock_rate <= 0.0 {
                bail!(ConfigError::new(format!(
                    "Type clock rate must be finite and positive, got {}",
                    type_clock_rate
                )));
            }
        }
        let type_rates = RealParameter::new("typeRates", &self.type_rates, 0.0, f64::INFINITY)?;

        let categories = if self.categories_per_type > 1 || self.assignments.is_some() {
            let branch_count = info.tree.len() - 1;
            let assignments = match self.assignments {
                Some(assignments) => assignments,
                None => {
                    let mut rng = match self.seed {
                        Some(seed) => StdRng::seed_from_u64(seed),
                        None => StdRng::from_entropy(),
                    };
                    (0..branch_count * type_count)
                        .map(|_| rng.gen_range(0..self.categories_per_type))
                        .collect()
                }
            };
            info!(
                "Using {} rate categories per type for {} types",
                self.categories_per_type, type_count
            );
            Some(RateCategories::new(
                &info.tree,
                self.categories_per_type,
                type_count,
                assignments,
            )?)
        } else {
            None
        };

        let n = info.tree.len();
        let rate_log = if self.log_rates {
            Some(RefCell::new(RealParameter::unbounded("branchRates", &vec![1.0; n])?))
        } else {
            None
        };
        let occupancy_log = if self.log_occupancies {
            Some(RefCell::new(RealParameter::new(
                "expectedOccupancy",
                &vec![0.0; n],
                0.0,
                1.0,
            )?))
        } else {
            None
        };
        info!("Set up a type-linked {} clock", self.policy);
        Ok(TypeLinkedClock {
            policy: self.policy,
            type_rates,
            categories,
            rate_log,
            occupancy_log,
        })
    }
}
