use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use tyche::asr::{PrunedPartials, SamplingMode};
use tyche::branch_rates::{BranchRateModel, ClockPolicy, StrictClock, TypeLinkedClockBuilder};
use tyche::likelihood::{AncestralTypeLikelihoodBuilder, Traversal};
use tyche::substitution_models::TypeSubstModel;
mod helpers;
use helpers::{black_box_type_info, TreeSizes, SEED};

fn sizes() -> TreeSizes {
    TreeSizes::from([("64", 6), ("512", 9), ("4096", 12)])
}

fn model() -> TypeSubstModel {
    TypeSubstModel::two_state(0.5, 0.3).expect("rates should be valid")
}

fn run_for_sizes<R: BranchRateModel, F: Fn(&tyche::type_info::TypeInfo) -> R>(
    traversal: Traversal,
    make_rates: F,
    group_name: &'static str,
    criterion: &mut Criterion,
) {
    let mut bench_group = criterion.benchmark_group(group_name);
    for (key, depth) in sizes() {
        let info = black_box_type_info(depth as u32);
        let rates = make_rates(&info);
        let mut likelihood = AncestralTypeLikelihoodBuilder::new(info, model(), rates)
            .traversal(traversal)
            .build()
            .expect("likelihood should build");
        bench_group.bench_function(key, |bench| {
            bench.iter(|| black_box(likelihood.calculate_log_p().expect("should compute")));
        });
    }
    bench_group.finish();
}

fn minimum_switch_strict(criterion: &mut Criterion) {
    run_for_sizes(
        Traversal::MinimumSwitch,
        |_| StrictClock::new(1.0).expect("rate should be valid"),
        "Minimum switch, strict clock",
        criterion,
    );
}

fn minimum_switch_expected_occupancy(criterion: &mut Criterion) {
    run_for_sizes(
        Traversal::MinimumSwitch,
        |info| {
            TypeLinkedClockBuilder::new(
                ClockPolicy::ExpectedOccupancy {
                    type_clock_rate: 1.0,
                },
                &[1.0, 3.0],
            )
            .build(info, Some(&model()))
            .expect("clock should build")
        },
        "Minimum switch, expected occupancy clock",
        criterion,
    );
}

fn direct_instant_switch(criterion: &mut Criterion) {
    run_for_sizes(
        Traversal::Direct,
        |info| {
            TypeLinkedClockBuilder::new(ClockPolicy::InstantSwitch, &[1.0, 3.0])
                .build(info, None)
                .expect("clock should build")
        },
        "Direct, instant switch clock",
        criterion,
    );
}

fn redraw_types(criterion: &mut Criterion) {
    let mut bench_group = criterion.benchmark_group("Redraw types");
    for (key, depth) in sizes() {
        let info = black_box_type_info(depth as u32);
        let clock = StrictClock::new(1.0).expect("rate should be valid");
        let mut likelihood = AncestralTypeLikelihoodBuilder::new(info, model(), clock)
            .build()
            .expect("likelihood should build");
        let mut rng = StdRng::seed_from_u64(SEED);
        bench_group.bench_function(key, |bench| {
            bench.iter(|| {
                black_box(
                    likelihood
                        .redraw_types(&mut rng, SamplingMode::Sample)
                        .expect("should draw"),
                )
            });
        });
        bench_group.bench_function(format!("{} pruning only", key), |bench| {
            bench.iter(|| {
                black_box(
                    PrunedPartials::new(likelihood.info(), likelihood.model(), likelihood.rates())
                        .expect("should prune"),
                )
            });
        });
    }
    bench_group.finish();
}

criterion_group! {
name = type_likelihood;
config = helpers::setup_suite();
targets = minimum_switch_strict, minimum_switch_expected_occupancy, direct_instant_switch,
}

criterion_group! {
name = type_sampling;
config = helpers::setup_suite();
targets = redraw_types,
}

criterion_main!(type_likelihood, type_sampling);
