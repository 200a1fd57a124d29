#![allow(dead_code)]
/// this file is essentially a workaround for #[cfg(test)] like behaviour for the benchmarks
/// The dev-depencies are only available in benchmarks or tests
use std::{collections::HashMap, hint::black_box, time::Duration};

use criterion::Criterion;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tyche::alphabets::TypeAlphabet;
use tyche::tree::tree_parser::from_newick;
use tyche::type_info::{TypeInfo, TypeInfoBuilder};

pub type TreeSizes = HashMap<&'static str, usize>;

pub const SEED: u64 = 0x7ec4e;

/// Balanced tree with `2^depth` leaves named `L0, L1, ...` and branch lengths of 0.1 to 1.
pub fn balanced_newick(depth: u32, rng: &mut StdRng) -> String {
    fn subtree(depth: u32, next_leaf: &mut usize, rng: &mut StdRng) -> String {
        let blen: f64 = rng.gen_range(0.1..1.0);
        if depth == 0 {
            *next_leaf += 1;
            return format!("L{}:{:.3}", *next_leaf - 1, blen);
        }
        let left = subtree(depth - 1, next_leaf, rng);
        let right = subtree(depth - 1, next_leaf, rng);
        format!("({},{}):{:.3}", left, right, blen)
    }
    let mut next_leaf = 0;
    let left = subtree(depth - 1, &mut next_leaf, rng);
    let right = subtree(depth - 1, &mut next_leaf, rng);
    format!("({},{});", left, right)
}

/// Binary types for a balanced tree, about a quarter of the leaves ambiguous.
pub fn black_box_type_info(depth: u32) -> TypeInfo {
    assert!(
        cfg!(feature = "deterministic"),
        "only run benches with '-F deterministic'"
    );
    let mut rng = StdRng::seed_from_u64(SEED);
    let newick = balanced_newick(depth, &mut rng);
    let traits = (0..2usize.pow(depth))
        .map(|i| {
            let code = match rng.gen_range(0..4) {
                0 => "?",
                1 => "1",
                _ => "0",
            };
            format!("L{}={}", i, code)
        })
        .collect::<Vec<_>>()
        .join(",");
    let tree = from_newick(&newick)
        .expect("generated newick should parse")
        .pop()
        .expect("generated newick should contain a tree");
    black_box(
        TypeInfoBuilder::new(tree, TypeAlphabet::binary())
            .trait_string(&traits)
            .build()
            .expect("generated types should build type info"),
    )
}

pub fn setup_suite() -> Criterion {
    Criterion::default()
        .measurement_time(Duration::from_secs(20))
        .with_profiler(pprof::criterion::PProfProfiler::new(
            997, // taken from the flamegraph repo's default
            pprof::criterion::Output::Flamegraph(None),
        ))
}

/// empty on purpose, there are no benches here but the crate still needs
/// to be runnable otherwise criterion crashes
fn main() {}
