use std::collections::HashSet;

use anyhow::bail;
use bio::io::fasta::Record;
use log::{info, warn};

use crate::alphabets::TypeAlphabet;
use crate::io::{DataError, TraitSet};
use crate::parameters::{IntegerParameter, RealParameter};
use crate::tree::Tree;
use crate::type_info::{default_occupancy, LeafObservation, TypeInfo};
use crate::{ConfigError, Result};

pub struct TypeInfoBuilder {
    tree: Tree,
    alphabet: TypeAlphabet,
    traits: Option<String>,
    records: Option<Vec<Record>>,
    node_types: Option<Vec<usize>>,
    occupancy: Option<Vec<f64>>,
}

impl TypeInfoBuilder {
    /// Creates a builder for the given tree and type alphabet. Leaf observations must be
    /// provided either as a trait string or as fasta records before building.
    ///
    /// # Example
    /// ```
    /// use tyche::alphabets::TypeAlphabet;
    /// use tyche::tree::tree_parser::from_newick;
    /// use tyche::type_info::TypeInfoBuilder;
    ///
    /// let tree = from_newick("((A:1,B:1)I1:1,C:2)R;").unwrap().pop().unwrap();
    /// let info = TypeInfoBuilder::new(tree, TypeAlphabet::binary())
    ///     .trait_string("A=0,B=0,C=1")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(info.node_types.values(), [0, 0, 0, 0, 1]);
    /// ```
    pub fn new(tree: Tree, alphabet: TypeAlphabet) -> TypeInfoBuilder {
        TypeInfoBuilder {
            tree,
            alphabet,
            traits: None,
            records: None,
            node_types: None,
            occupancy: None,
        }
    }

    /// Sets the leaf observations from a `taxon=code,...` string.
    pub fn trait_string(mut self, traits: &str) -> TypeInfoBuilder {
        self.traits = Some(traits.to_string());
        self
    }

    /// Sets the leaf observations from fasta records. For space delimited alphabets each
    /// whitespace separated word is one site, otherwise every character is.
    pub fn records(mut self, records: Vec<Record>) -> TypeInfoBuilder {
        self.records = Some(records);
        self
    }

    /// Sets the initial type of every node, indexed like the tree nodes.
    pub fn node_types(mut self, node_types: Vec<usize>) -> TypeInfoBuilder {
        self.node_types = Some(node_types);
        self
    }

    /// Sets the initial occupancy of every branch, indexed by the node below it.
    pub fn occupancy(mut self, occupancy: Vec<f64>) -> TypeInfoBuilder {
        self.occupancy = Some(occupancy);
        self
    }

    /// Builds the type info.
    /// Bails if leaf labels are missing or not unique.
    /// Bails if a leaf has no observation or an observation names a taxon not in the tree.
    /// Bails if an observed code is not part of the alphabet or leaves have different site counts.
    /// Bails if provided node types or occupancies have the wrong dimension, are out of bounds,
    /// or if a node type contradicts an unambiguous leaf observation.
    pub fn build(self) -> Result<TypeInfo> {
        info!("Setting up type info with {}", self.alphabet);
        self.validate_leaf_ids()?;
        let traits = match (&self.traits, &self.records) {
            (Some(traits), None) => TraitSet::parse(traits)?,
            (None, Some(records)) => TraitSet::from_records(records)?,
            (Some(_), Some(_)) => bail!(ConfigError::new(
                "Leaf types given both as a trait string and as records"
            )),
            (None, None) => bail!(ConfigError::new("No leaf types provided")),
        };
        let observations = self.leaf_observations(&traits)?;
        info!("{} leaf observation(s) read successfully", traits.len());

        let k = self.alphabet.state_count();
        let node_types = match &self.node_types {
            Some(node_types) => {
                self.check_dimension("Node type", node_types.len())?;
                self.check_known_leaves(node_types, &observations)?;
                node_types.clone()
            }
            None => {
                info!("No node types provided, internal nodes start in type 0");
                observations
                    .iter()
                    .map(|obs| obs.as_ref().map(|o| o.allowed[0][0]).unwrap_or(0))
                    .collect()
            }
        };
        let node_types = IntegerParameter::new("nodeTypes", &node_types, 0, k - 1)?;

        let occupancy = match &self.occupancy {
            Some(occupancy) => {
                self.check_dimension("Occupancy", occupancy.len())?;
                occupancy.clone()
            }
            None => self.default_occupancies(&node_types),
        };
        let occupancy = RealParameter::new("occupancy", &occupancy, 0.0, 1.0)?;

        Ok(TypeInfo {
            tree: self.tree,
            alphabet: self.alphabet,
            node_types,
            occupancy,
            observations,
        })
    }

    fn validate_leaf_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for id in self.tree.leaf_ids() {
            if id.is_empty() {
                bail!(DataError {
                    message: String::from("All tree leaves must be labelled")
                });
            }
            if !seen.insert(id) {
                bail!(DataError {
                    message: format!("Leaf label {} is not unique", id)
                });
            }
        }
        Ok(())
    }

    fn leaf_observations(&self, traits: &TraitSet) -> Result<Vec<Option<LeafObservation>>> {
        let mut unknown: Vec<&String> = traits
            .taxa()
            .iter()
            .filter(|taxon| !self.tree.leaf_ids().contains(taxon))
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            bail!(DataError {
                message: format!("Types given for taxa not in the tree: {unknown:?}")
            });
        }
        let mut observations = vec![None; self.tree.len()];
        let mut site_count = None;
        for leaf in self.tree.leaves() {
            let Some(value) = traits.value(&leaf.id) else {
                bail!(DataError {
                    message: format!("No type given for taxon {}", leaf.id)
                });
            };
            let codes = self.split_sites(value);
            if codes.is_empty() {
                bail!(DataError {
                    message: format!("Empty type for taxon {}", leaf.id)
                });
            }
            if *site_count.get_or_insert(codes.len()) != codes.len() {
                bail!(DataError {
                    message: format!("Taxon {} has a different number of sites", leaf.id)
                });
            }
            let allowed = codes
                .iter()
                .map(|code| self.alphabet.state_set(code))
                .collect::<Result<Vec<_>>>()?;
            observations[usize::from(leaf.idx)] = Some(LeafObservation { codes, allowed });
        }
        Ok(observations)
    }

    fn split_sites(&self, value: &str) -> Vec<String> {
        if self.alphabet.is_delimited() {
            value.split_whitespace().map(str::to_string).collect()
        } else {
            value
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| c.to_string())
                .collect()
        }
    }

    fn check_dimension(&self, name: &str, len: usize) -> Result<()> {
        if len != self.tree.len() {
            bail!(ConfigError::new(format!(
                "{} dimension {} does not match the {} tree nodes",
                name,
                len,
                self.tree.len()
            )));
        }
        Ok(())
    }

    fn check_known_leaves(
        &self,
        node_types: &[usize],
        observations: &[Option<LeafObservation>],
    ) -> Result<()> {
        for leaf in self.tree.leaves() {
            let i = usize::from(leaf.idx);
            let Some(obs) = &observations[i] else {
                continue;
            };
            if !obs.allowed_states().contains(&node_types[i]) {
                bail!(ConfigError::new(format!(
                    "Type {} of leaf {} contradicts its observation {}",
                    node_types[i],
                    leaf.id,
                    obs.code()
                )));
            }
        }
        Ok(())
    }

    fn default_occupancies(&self, node_types: &IntegerParameter) -> Vec<f64> {
        warn!("No occupancies provided, starting from the switch-count defaults");
        self.tree
            .iter()
            .map(|node| {
                let child_type = node_types.value(usize::from(node.idx));
                let parent_type = node
                    .parent
                    .map_or(child_type, |p| node_types.value(usize::from(p)));
                default_occupancy(parent_type, child_type)
            })
            .collect()
    }
}
