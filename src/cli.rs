use std::fmt::{self, Display};
use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use log::LevelFilter;

use tyche::asr::SamplingMode;
use tyche::branch_rates::ClockPolicy;
use tyche::likelihood::Traversal;

use crate::Result;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Cli {
    /// Tree file in newick format, the first tree is used
    #[arg(short, long, value_name = "TREE_FILE")]
    pub(super) tree_file: PathBuf,

    /// Leaf types as taxon=code pairs, e.g. "A=0,B=1,C=?"
    #[arg(short = 'y', long, value_name = "TRAITS", conflicts_with = "types_file")]
    pub(super) traits: Option<String>,

    /// Leaf types in fasta format, one record per taxon
    #[arg(short = 'f', long, value_name = "TYPES_FILE")]
    pub(super) types_file: Option<PathBuf>,

    /// Type codes: "binary", single characters such as "LH", comma separated names
    /// such as "human,bat", or a code map such as "A=0,B=1,AB=0 1"
    #[arg(short, long, value_name = "ALPHABET", default_value = "binary")]
    pub(super) alphabet: String,

    /// Switching rates: alpha and beta for two types, otherwise all off-diagonal rates
    /// row by row
    #[arg(short = 'q', long, value_name = "RATES", num_args = 1.., required = true)]
    pub(super) switch_rates: Vec<f64>,

    /// Root frequencies, stationary for two types and uniform otherwise when not given
    #[arg(long, value_name = "FREQS", num_args = 1..)]
    pub(super) freqs: Vec<f64>,

    /// Branch rate policy
    #[arg(short, long, value_enum, default_value_t = PolicyArg::Strict)]
    pub(super) policy: PolicyArg,

    /// Substitution rate of each type (times categories per type for relaxed clocks)
    #[arg(short = 'r', long, value_name = "TYPE_RATES", num_args = 1..)]
    pub(super) type_rates: Vec<f64>,

    /// Rate categories per type of a relaxed type-linked clock
    #[arg(long, default_value_t = 1)]
    pub(super) categories: usize,

    /// Rate of the strict clock
    #[arg(long, default_value_t = 1.0)]
    pub(super) clock_rate: f64,

    /// Scaling of branch lengths into type time for expected occupancy
    #[arg(long, default_value_t = 1.0)]
    pub(super) type_clock_rate: f64,

    /// How branches are scored
    #[arg(long, value_enum, default_value_t = TraversalArg::MinimumSwitch)]
    pub(super) traversal: TraversalArg,

    /// Types of labelled nodes as ID=code pairs, e.g. "I1=0,R=1"
    #[arg(short, long, value_name = "NODE_TYPES")]
    pub(super) node_types: Option<String>,

    /// Redraw the node types from the pruned partial likelihoods before scoring
    #[arg(long, value_enum)]
    pub(super) redraw: Option<RedrawArg>,

    /// Seed for redrawing node types and initial rate categories
    #[arg(long)]
    pub(super) seed: Option<u64>,

    /// Name of the node annotation in the output tree
    #[arg(long, default_value = "type")]
    pub(super) tag: String,

    /// Output file for the tree annotated with node types
    #[arg(short, long, value_name = "OUTPUT_TREE")]
    pub(super) output_tree: Option<PathBuf>,

    /// More logging, repeat for debug output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub(super) verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub(super) enum PolicyArg {
    Strict,
    Instant,
    Expected,
    Mixed,
    Occupancy,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub(super) enum TraversalArg {
    MinimumSwitch,
    Direct,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub(super) enum RedrawArg {
    Sample,
    Map,
}

pub(super) enum LeafTypes {
    Traits(String),
    Fasta(PathBuf),
}

/// Branch rates to score the types with, `None` meaning a strict clock.
pub(super) type RatePolicy = Option<ClockPolicy>;

pub(super) struct Config {
    pub(super) tree_file: PathBuf,
    pub(super) leaf_types: LeafTypes,
    pub(super) alphabet: String,
    pub(super) switch_rates: Vec<f64>,
    pub(super) freqs: Vec<f64>,
    pub(super) policy: RatePolicy,
    pub(super) type_rates: Vec<f64>,
    pub(super) categories: usize,
    pub(super) clock_rate: f64,
    pub(super) traversal: Traversal,
    pub(super) node_types: Option<String>,
    pub(super) redraw: Option<SamplingMode>,
    pub(super) seed: Option<u64>,
    pub(super) tag: String,
    pub(super) output_tree: Option<PathBuf>,
    pub(super) log_level: LevelFilter,
}

impl Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tree file: {}", self.tree_file.display())?;
        match &self.leaf_types {
            LeafTypes::Traits(traits) => writeln!(f, "Leaf types: {}", traits)?,
            LeafTypes::Fasta(path) => writeln!(f, "Leaf types file: {}", path.display())?,
        }
        writeln!(f, "Alphabet: {}", self.alphabet)?;
        writeln!(f, "Switching rates: {:?}", self.switch_rates)?;
        match &self.policy {
            Some(policy) => writeln!(f, "Type-linked {} clock, rates {:?}", policy, self.type_rates)?,
            None => writeln!(f, "Strict clock with rate {}", self.clock_rate)?,
        }
        write!(f, "Traversal: {}", self.traversal)
    }
}

pub(super) struct ConfigBuilder {
    cli: Cli,
}

impl From<Cli> for ConfigBuilder {
    fn from(cli: Cli) -> Self {
        ConfigBuilder { cli }
    }
}

impl ConfigBuilder {
    pub(super) fn setup(self) -> Result<Config> {
        let cli = self.cli;
        let leaf_types = match (cli.traits, cli.types_file) {
            (Some(traits), None) => LeafTypes::Traits(traits),
            (None, Some(path)) => LeafTypes::Fasta(path),
            _ => bail!("Leaf types must be given either with --traits or with --types-file"),
        };
        let policy = match cli.policy {
            PolicyArg::Strict => None,
            PolicyArg::Instant => Some(ClockPolicy::InstantSwitch),
            PolicyArg::Expected => Some(ClockPolicy::ExpectedOccupancy {
                type_clock_rate: cli.type_clock_rate,
            }),
            PolicyArg::Mixed => Some(ClockPolicy::MixedSwitch {
                type_clock_rate: cli.type_clock_rate,
            }),
            PolicyArg::Occupancy => Some(ClockPolicy::OccupancyLinked),
        };
        if policy.is_some() && cli.type_rates.is_empty() {
            bail!("Type-linked clocks need --type-rates");
        }
        let log_level = match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        };
        Ok(Config {
            tree_file: cli.tree_file,
            leaf_types,
            alphabet: cli.alphabet,
            switch_rates: cli.switch_rates,
            freqs: cli.freqs,
            policy,
            type_rates: cli.type_rates,
            categories: cli.categories,
            clock_rate: cli.clock_rate,
            traversal: match cli.traversal {
                TraversalArg::MinimumSwitch => Traversal::MinimumSwitch,
                TraversalArg::Direct => Traversal::Direct,
            },
            node_types: cli.node_types,
            redraw: cli.redraw.map(|mode| match mode {
                RedrawArg::Sample => SamplingMode::Sample,
                RedrawArg::Map => SamplingMode::Map,
            }),
            seed: cli.seed,
            tag: cli.tag,
            output_tree: cli.output_tree,
            log_level,
        })
    }
}
