use rstest::*;

use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use tempfile::tempdir;

use crate::io::{
    read_newick_from_file, read_types_from_fasta, write_annotated_newick_to_file,
    write_newick_to_file, DataError, TraitSet,
};
use crate::tree;

#[test]
fn reading_type_fasta() {
    let records = read_types_from_fasta(&PathBuf::from("./data/four_taxa_host_types.fasta")).unwrap();
    assert_eq!(records.len(), 4);
    let traits = TraitSet::from_records(&records).unwrap();
    assert_eq!(traits.taxa(), ["A", "B", "C", "D"]);
    assert_eq!(traits.value("B"), Some("?"));
}

#[rstest]
#[case::empty_name("./data/types_garbage_empty_name.fasta", "Expecting id")]
#[case::nonexistent("./data/types_nonexistent.fasta", "")]
fn reading_incorrect_fasta(#[case] input: &str, #[case] exp_error: &str) {
    let res = read_types_from_fasta(&PathBuf::from(input));
    assert!(res.is_err());
    assert!(res.unwrap_err().to_string().contains(exp_error));
}

#[test]
fn reading_newick() {
    let trees = read_newick_from_file(&PathBuf::from("./data/four_taxa.newick")).unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].n, 4);
    assert_eq!(trees[0].height, 3.0);
    assert!(read_newick_from_file(&PathBuf::from("./data/nonexistent.newick")).is_err());
}

#[rstest]
#[case::simple("A=0,B=1,C=?", &[("A", "0"), ("B", "1"), ("C", "?")])]
#[case::spaces(" A = 0 ,  B=1 ", &[("A", "0"), ("B", "1")])]
#[case::trailing_comma("A=host,", &[("A", "host")])]
#[case::empty("", &[])]
fn parse_trait_set(#[case] input: &str, #[case] expected: &[(&str, &str)]) {
    let traits = TraitSet::parse(input).unwrap();
    assert_eq!(traits.len(), expected.len());
    assert_eq!(traits.is_empty(), expected.is_empty());
    for (taxon, value) in expected {
        assert_eq!(traits.value(taxon), Some(*value));
    }
}

#[rstest]
#[case::no_equals("A=0,B")]
#[case::no_taxon("=0")]
#[case::no_value("A=")]
#[case::duplicate("A=0,A=1")]
fn malformed_trait_set(#[case] input: &str) {
    let err = TraitSet::parse(input).unwrap_err();
    assert!(err.downcast_ref::<DataError>().is_some());
}

#[test]
fn write_newick() {
    let tree = tree!("((A:1,B:1)I1:1,C:2)R;");
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("output.newick");
    write_newick_to_file(&[tree], output_path.clone()).unwrap();
    let mut file_content = String::new();
    File::open(output_path)
        .unwrap()
        .read_to_string(&mut file_content)
        .unwrap();
    assert_eq!(file_content, "((A:1,B:1)I1:1,C:2)R;\n");
}

#[test]
fn write_annotated_newick() {
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("output.newick");
    let lines = vec!["(A[&t=\"0\"]:1,B[&t=\"1\"]:1)R[&t=\"0\"];".to_string()];
    write_annotated_newick_to_file(&lines, output_path.clone()).unwrap();
    assert_eq!(fs::read_to_string(output_path).unwrap(), format!("{}\n", lines[0]));
}

#[test]
fn write_to_existing_file() {
    let tree = tree!("(A:1,B:1)R;");
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("output.newick");
    fs::write(&output_path, "").unwrap();
    let err = write_newick_to_file(&[tree], output_path).unwrap_err();
    assert!(err.downcast_ref::<DataError>().is_some());
}

#[test]
fn write_to_bad_path() {
    let tree = tree!("(A:1,B:1)R;");
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("nonexistent_folder").join("out.newick");
    assert!(write_newick_to_file(&[tree], output_path).is_err());
}
