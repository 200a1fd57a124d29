use approx::assert_relative_eq;
use itertools::iproduct;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::alphabets::TypeAlphabet;
use crate::asr::{reconstruct_types, sample_types, PartialsProvider, PrunedPartials, SamplingMode};
use crate::branch_rates::StrictClock;
use crate::likelihood::{AncestralTypeLikelihoodBuilder, MinimumSwitches, Traversal};
use crate::substitution_models::{FreqVector, SubstMatrix, TypeSubstModel};
use crate::tree::NodeIdx::{self, Internal as I, Leaf as L};
use crate::type_info::{TypeInfo, TypeInfoBuilder};
use crate::{binary_info, frequencies, tree, ConfigError};

const NEWICK: &str = "((A:1,B:1)I1:1,C:2)R;";

fn model() -> TypeSubstModel {
    TypeSubstModel::two_state(0.5, 0.3).unwrap()
}

fn clock() -> StrictClock {
    StrictClock::new(1.0).unwrap()
}

fn info() -> TypeInfo {
    binary_info!(NEWICK, "A=0,B=0,C=1")
}

#[test]
fn reconstruct_known_and_sampled_types() {
    let info = TypeInfoBuilder::new(tree!(NEWICK), TypeAlphabet::binary())
        .trait_string("A=0,B=?,C=1")
        .node_types(vec![1, 0, 0, 1, 1])
        .build()
        .unwrap();
    assert_eq!(reconstruct_types(&info), [1, 0, 0, 1, 1]);
}

#[test]
fn pruning_matches_enumeration() {
    let info = info();
    let model = model();
    let partials = PrunedPartials::new(&info, &model, &clock()).unwrap();
    let p1 = model.p(1.0);
    let p2 = model.p(2.0);
    let pi = model.freqs();
    let expected: f64 = iproduct!(0..2, 0..2)
        .map(|(root, i1)| {
            pi[root] * p1[(root, i1)] * p1[(i1, 0)] * p1[(i1, 0)] * p2[(root, 1)]
        })
        .sum();
    assert_relative_eq!(partials.logl(), expected.ln(), epsilon = 1e-10);
    assert_eq!(partials.node_count(), 5);
    assert_eq!(partials.partials(&L(2)).as_slice(), [1.0, 0.0]);
    assert_eq!(partials.partials(&L(4)).as_slice(), [0.0, 1.0]);
    assert_eq!(partials.transition_probabilities(&I(0)), &SubstMatrix::identity(2, 2));
}

#[test]
fn pruning_ambiguous_leaf_sums_states() {
    let info = binary_info!(NEWICK, "A=0,B=?,C=1");
    let partials = PrunedPartials::new(&info, &model(), &clock()).unwrap();
    assert_eq!(partials.partials(&L(3)).as_slice(), [1.0, 1.0]);
    assert!(partials.logl() < 0.0);
}

#[test]
fn map_draw_is_deterministic() {
    let mut info = info();
    let partials = PrunedPartials::new(&info, &model(), &clock()).unwrap();
    let freqs = model().freqs().clone();
    let mut rng = StdRng::seed_from_u64(1);
    let first = sample_types(&mut info, &partials, &freqs, &mut rng, SamplingMode::Map).unwrap();
    let second = sample_types(&mut info, &partials, &freqs, &mut rng, SamplingMode::Map).unwrap();
    assert_eq!(first, second);
    assert_eq!(&first.states[2..], [0, 0, 1]);
    assert_eq!(info.node_types.values(), first.states.as_slice());
    assert!(first.log_density <= 0.0);
    assert!(info.tree.something_is_dirty());
}

#[test]
fn sampled_root_follows_posterior() {
    let mut info = info();
    let model = model();
    let partials = PrunedPartials::new(&info, &model, &clock()).unwrap();
    let root_weights = partials.partials(&I(0)).component_mul(model.freqs());
    let expected = root_weights[1] / root_weights.sum();

    let mut rng = StdRng::seed_from_u64(42);
    let draws = 4000;
    let mut ones = 0;
    for _ in 0..draws {
        let sampled =
            sample_types(&mut info, &partials, model.freqs(), &mut rng, SamplingMode::Sample)
                .unwrap();
        assert_eq!(&sampled.states[2..], [0, 0, 1]);
        assert!(sampled.log_density <= 0.0);
        ones += sampled.states[0];
    }
    assert_relative_eq!(ones as f64 / draws as f64, expected, epsilon = 0.03);
}

#[test]
fn ambiguous_leaf_draws_allowed_type() {
    let alphabet = TypeAlphabet::from_code_map("A=0,B=1,C=2,AB=0 1").unwrap();
    let mut info = TypeInfoBuilder::new(tree!(NEWICK), alphabet)
        .trait_string("A=A,B=AB,C=C")
        .build()
        .unwrap();
    let model = TypeSubstModel::from_rates(3, &[0.2; 6], &[1.0 / 3.0; 3]).unwrap();
    let partials = PrunedPartials::new(&info, &model, &clock()).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..200 {
        let sampled =
            sample_types(&mut info, &partials, model.freqs(), &mut rng, SamplingMode::Sample)
                .unwrap();
        assert!(sampled.states[3] < 2);
        assert_eq!(sampled.states[2], 0);
        assert_eq!(sampled.states[4], 2);
    }
}

#[test]
fn partials_for_another_tree() {
    let mut info = info();
    let other = binary_info!("(((A:0.5,B:0.5)I2:1.5,C:2)I1:1,D:3)R;", "A=0,B=0,C=1,D=1");
    let partials = PrunedPartials::new(&other, &model(), &clock()).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let err = sample_types(&mut info, &partials, model().freqs(), &mut rng, SamplingMode::Map)
        .unwrap_err();
    assert!(err.downcast_ref::<ConfigError>().is_some());
}

#[test]
fn wrong_frequency_count() {
    let mut info = info();
    let partials = PrunedPartials::new(&info, &model(), &clock()).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let freqs = frequencies!(&[0.2, 0.3, 0.5]);
    let err = sample_types(&mut info, &partials, &freqs, &mut rng, SamplingMode::Map).unwrap_err();
    assert!(err.downcast_ref::<ConfigError>().is_some());
}

struct ZeroPartials {
    zeros: FreqVector,
    identity: SubstMatrix,
}

impl PartialsProvider for ZeroPartials {
    fn node_count(&self) -> usize {
        5
    }
    fn partials(&self, _: &NodeIdx) -> &FreqVector {
        &self.zeros
    }
    fn transition_probabilities(&self, _: &NodeIdx) -> &SubstMatrix {
        &self.identity
    }
}

#[test]
fn zero_weight_cannot_be_drawn() {
    let mut info = info();
    let partials = ZeroPartials {
        zeros: FreqVector::zeros(2),
        identity: SubstMatrix::identity(2, 2),
    };
    let mut rng = StdRng::seed_from_u64(0);
    for mode in [SamplingMode::Map, SamplingMode::Sample] {
        assert!(sample_types(&mut info, &partials, model().freqs(), &mut rng, mode).is_err());
    }
    assert_eq!(info.node_types.values(), [0, 0, 0, 0, 1]);
}

#[test]
fn redraw_through_likelihood() {
    let mut likelihood = AncestralTypeLikelihoodBuilder::new(info(), model(), clock())
        .traversal(Traversal::Direct)
        .build()
        .unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let sampled = likelihood.redraw_types(&mut rng, SamplingMode::Map).unwrap();
    assert_eq!(likelihood.reconstructed_types(), sampled.states);
    assert!(likelihood.calculate_log_p().unwrap().is_finite());
}

#[test]
fn redraw_resets_occupancy_of_switched_branches() {
    let info = binary_info!(NEWICK, "A=1,B=1,C=1");
    assert_eq!(info.occupancy.values(), [0.0, 0.0, 0.5, 0.5, 0.5]);
    let mut likelihood = AncestralTypeLikelihoodBuilder::new(info, model(), clock())
        .build()
        .unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let sampled = likelihood.redraw_types(&mut rng, SamplingMode::Map).unwrap();
    assert_eq!(sampled.states, [1, 1, 1, 1, 1]);
    assert_eq!(likelihood.info().occupancy.values(), [1.0; 5]);

    let logp = likelihood.calculate_log_p().unwrap();
    let joint = likelihood.joint().unwrap();
    assert!(joint
        .branches
        .iter()
        .all(|b| b.switches == Some(MinimumSwitches::Zero)));
    let stay = |t: f64| 0.625 + 0.375 * (-0.8 * t).exp();
    assert_relative_eq!(logp, 3.0 * stay(1.0).ln() + stay(2.0).ln(), epsilon = 1e-10);
}

#[test]
fn redraw_keeps_occupancy_of_unchanged_branches() {
    let mut info = TypeInfoBuilder::new(tree!(NEWICK), TypeAlphabet::binary())
        .trait_string("A=1,B=1,C=1")
        .node_types(vec![1, 1, 1, 1, 1])
        .occupancy(vec![1.0, 0.4, 0.3, 1.0, 1.0])
        .build()
        .unwrap();
    let partials = PrunedPartials::new(&info, &model(), &clock()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    sample_types(&mut info, &partials, model().freqs(), &mut rng, SamplingMode::Map).unwrap();
    assert_eq!(info.node_types.values(), [1, 1, 1, 1, 1]);
    assert_eq!(info.occupancy.values(), [1.0, 0.4, 0.3, 1.0, 1.0]);
}
