use anyhow::{anyhow, bail, Error};
use clap::Parser;
use ftail::Ftail;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use tyche::alphabets::TypeAlphabet;
use tyche::branch_rates::{BranchRateModel, StrictClock, TypeLinkedClockBuilder};
use tyche::io::{
    read_newick_from_file, read_types_from_fasta, write_annotated_newick_to_file, TraitSet,
};
use tyche::likelihood::AncestralTypeLikelihoodBuilder;
use tyche::substitution_models::TypeSubstModel;
use tyche::tree::Tree;
use tyche::type_info::{TypeInfo, TypeInfoBuilder};

mod cli;
use crate::cli::{Cli, Config, ConfigBuilder, LeafTypes};

type Result<T> = std::result::Result<T, Error>;

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => bail!("Unable to parse command line arguments: \n {}", error),
    };
    let cfg = ConfigBuilder::from(cli).setup()?;
    Ftail::new()
        .console(cfg.log_level)
        .init()
        .map_err(|e| anyhow!("Unable to set up logging: {:?}", e))?;
    info!("Configuration:\n{}", cfg);

    let trees = read_newick_from_file(&cfg.tree_file)?;
    let Some(tree) = trees.into_iter().next() else {
        bail!("No trees found in {}", cfg.tree_file.display());
    };
    let alphabet = parse_alphabet(&cfg.alphabet)?;
    let info = build_type_info(&cfg, tree, alphabet)?;
    let model = build_model(&cfg, info.state_count())?;

    match &cfg.policy {
        None => run(&cfg, info, model, StrictClock::new(cfg.clock_rate)?),
        Some(policy) => {
            let mut builder = TypeLinkedClockBuilder::new(*policy, &cfg.type_rates)
                .categories_per_type(cfg.categories);
            if let Some(seed) = cfg.seed {
                builder = builder.seed(seed);
            }
            let rates = builder.build(&info, Some(&model))?;
            run(&cfg, info, model, rates)
        }
    }
}

fn run<R: BranchRateModel>(
    cfg: &Config,
    info: TypeInfo,
    model: TypeSubstModel,
    rates: R,
) -> Result<()> {
    let mut likelihood = AncestralTypeLikelihoodBuilder::new(info, model, rates)
        .traversal(cfg.traversal)
        .tag(&cfg.tag)
        .build()?;
    if let Some(mode) = cfg.redraw {
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        likelihood.redraw_types(&mut rng, mode)?;
    }
    let logp = likelihood.calculate_log_p()?;
    if let Some(joint) = likelihood.joint() {
        for branch in &joint.branches {
            debug!(
                "Branch above {}: {} -> {}, rate {}, log-likelihood {}",
                likelihood.info().tree.node_id(&branch.node),
                branch.parent_type,
                branch.child_type,
                branch
                    .rate
                    .map_or(String::from("impossible"), |rate| rate.to_string()),
                branch.logl
            );
        }
    }
    println!("logP = {}", logp);
    if let Some(path) = &cfg.output_tree {
        write_annotated_newick_to_file(&[likelihood.annotated_newick()], path.clone())?;
    }
    Ok(())
}

/// Recognises "binary", code maps containing '=', comma separated names and otherwise
/// one type per character.
fn parse_alphabet(alphabet: &str) -> Result<TypeAlphabet> {
    if alphabet == "binary" {
        Ok(TypeAlphabet::binary())
    } else if alphabet.contains('=') {
        TypeAlphabet::from_code_map(alphabet)
    } else if alphabet.contains(',') {
        let codes: Vec<&str> = alphabet.split(',').map(str::trim).collect();
        TypeAlphabet::user(&codes)
    } else {
        TypeAlphabet::characters(alphabet)
    }
}

fn build_type_info(cfg: &Config, tree: Tree, alphabet: TypeAlphabet) -> Result<TypeInfo> {
    let builder = |tree: Tree, alphabet: TypeAlphabet| -> Result<TypeInfoBuilder> {
        Ok(match &cfg.leaf_types {
            LeafTypes::Traits(traits) => TypeInfoBuilder::new(tree, alphabet).trait_string(traits),
            LeafTypes::Fasta(path) => {
                TypeInfoBuilder::new(tree, alphabet).records(read_types_from_fasta(path)?)
            }
        })
    };
    let Some(node_types) = &cfg.node_types else {
        return builder(tree, alphabet)?.build();
    };
    let defaults = builder(tree.clone(), alphabet.clone())?.build()?;
    let mut types = defaults.node_types.values().to_vec();
    let assigned = TraitSet::parse(node_types)?;
    for id in assigned.taxa() {
        let idx = tree.try_idx(id)?;
        let code = assigned.value(id).unwrap_or_default();
        match alphabet.state_set(code)?.as_slice() {
            [state] => types[usize::from(&idx)] = *state,
            _ => bail!("Node {} must be given a single type, got '{}'", id, code),
        }
    }
    builder(tree, alphabet)?.node_types(types).build()
}

fn build_model(cfg: &Config, types: usize) -> Result<TypeSubstModel> {
    let rates = &cfg.switch_rates;
    let mut model = if types == 2 && rates.len() == 2 {
        TypeSubstModel::two_state(rates[0], rates[1])?
    } else {
        let uniform = vec![1.0 / types as f64; types];
        TypeSubstModel::from_rates(types, rates, &uniform)?
    };
    if !cfg.freqs.is_empty() {
        model.set_freqs(&cfg.freqs)?;
    }
    info!("Type switching rate matrix:{}", model.q());
    Ok(model)
}
