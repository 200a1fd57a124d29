use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::bail;
use bio::io::fasta::{Reader, Record};
use hashbrown::HashMap;
use log::info;

use crate::tree::{tree_parser, Tree};
use crate::Result;

pub struct DataError {
    pub(crate) message: String,
}
impl fmt::Debug for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl Error for DataError {}

/// Taxon to trait value mapping, parsed from strings such as `"A=0, B=1, C=?"`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitSet {
    taxa: Vec<String>,
    values: HashMap<String, String>,
}

impl TraitSet {
    /// Parses a comma separated list of `taxon=value` pairs. Whitespace around taxa and
    /// values is ignored.
    ///
    /// # Example
    /// ```
    /// use tyche::io::TraitSet;
    /// let traits = TraitSet::parse("human=0, bat=1,pig=?").unwrap();
    /// assert_eq!(traits.len(), 3);
    /// assert_eq!(traits.value("bat"), Some("1"));
    /// assert_eq!(traits.value("cow"), None);
    /// ```
    pub fn parse(traits: &str) -> Result<TraitSet> {
        let mut taxa = Vec::new();
        let mut values = HashMap::new();
        for pair in traits.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((taxon, value)) = pair.split_once('=') else {
                bail!(DataError {
                    message: format!("Could not parse trait '{}', expected taxon=value", pair)
                });
            };
            let (taxon, value) = (taxon.trim(), value.trim());
            if taxon.is_empty() || value.is_empty() {
                bail!(DataError {
                    message: format!("Could not parse trait '{}', expected taxon=value", pair)
                });
            }
            if values.insert(taxon.to_string(), value.to_string()).is_some() {
                bail!(DataError {
                    message: format!("Taxon {} has more than one trait value", taxon)
                });
            }
            taxa.push(taxon.to_string());
        }
        Ok(TraitSet { taxa, values })
    }

    /// Builds a trait set from fasta records, the sequence being the trait value.
    pub fn from_records(records: &[Record]) -> Result<TraitSet> {
        let mut taxa = Vec::new();
        let mut values = HashMap::new();
        for rec in records {
            let value = String::from_utf8_lossy(rec.seq()).trim().to_string();
            if values.insert(rec.id().to_string(), value).is_some() {
                bail!(DataError {
                    message: format!("Taxon {} has more than one record", rec.id())
                });
            }
            taxa.push(rec.id().to_string());
        }
        Ok(TraitSet { taxa, values })
    }

    pub fn value(&self, taxon: &str) -> Option<&str> {
        self.values.get(taxon).map(String::as_str)
    }

    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }
}

/// Reads per-taxon type observations from a fasta file, one record per taxon.
///
/// # Arguments
/// * `path` - Path to the fasta file.
///
/// # Example
/// ```
/// use tyche::io::read_types_from_fasta;
/// use std::path::PathBuf;
/// let records = read_types_from_fasta(&PathBuf::from("./data/three_taxa_types.fasta")).unwrap();
/// # assert_eq!(records.len(), 3);
/// # assert_eq!(records[2].seq(), b"1");
/// ```
pub fn read_types_from_fasta(path: &Path) -> Result<Vec<Record>> {
    info!("Reading types from file {}", path.display());
    let reader = Reader::from_file(path)?;
    let mut records = Vec::new();
    for result in reader.records() {
        let rec = result?;
        if let Err(e) = rec.check() {
            bail!(DataError {
                message: e.to_string()
            });
        }
        records.push(rec);
    }
    if records.is_empty() {
        bail!(DataError {
            message: String::from("No type records found in file")
        });
    }
    info!("Read {} type record(s) successfully", records.len());
    Ok(records)
}

/// Reads newick trees from a file, returning a vector of trees.
///
/// # Arguments
/// * `path` - Path to the newick file.
///
/// # Example
/// ```
/// use tyche::io::read_newick_from_file;
/// use std::path::PathBuf;
/// let trees = read_newick_from_file(&PathBuf::from("./data/three_taxa.newick")).unwrap();
/// # assert_eq!(trees.len(), 1);
/// # assert_eq!(trees[0].leaves().len(), 3);
/// ```
pub fn read_newick_from_file(path: &Path) -> Result<Vec<Tree>> {
    info!("Reading newick trees from file {}", path.display());
    let newick = fs::read_to_string(path)?;
    info!("Read file successfully");
    tree_parser::from_newick(&newick)
}

/// Writes newick trees to the given file path. Will return an error if the file already exists.
///
/// # Arguments
/// * `trees` - Vector of newick trees.
/// * `path` - Path to the newick file.
pub fn write_newick_to_file(trees: &[Tree], path: PathBuf) -> Result<()> {
    let newick: Vec<String> = trees.iter().map(|tree| tree.to_newick()).collect();
    write_lines_to_file(&newick, path)
}

/// Writes already formatted (e.g. annotated) newick strings, one per line. Will return an
/// error if the file already exists.
pub fn write_annotated_newick_to_file(newick: &[String], path: PathBuf) -> Result<()> {
    write_lines_to_file(newick, path)
}

fn write_lines_to_file(lines: &[String], path: PathBuf) -> Result<()> {
    info!("Writing newick trees to file {}", path.display());
    if path.exists() {
        bail!(DataError {
            message: String::from("File already exists")
        });
    }
    let mut writer = File::create(path)?;
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    info!("Finished writing successfully");
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
