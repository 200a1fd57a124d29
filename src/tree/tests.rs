use approx::assert_relative_eq;
use rstest::rstest;

use crate::tree;
use crate::tree::{
    tree_parser::{from_newick, ParsingError},
    NodeIdx::{Internal as I, Leaf as L},
};

#[test]
fn try_idx_by_id() {
    let tree = tree!("(((A:1.0,B:1.0)E:2.0,C:1.0)F:1.0,D:1.0)G;");
    let nodes = [
        ("A", L(3)),
        ("B", L(4)),
        ("C", L(5)),
        ("D", L(6)),
        ("E", I(2)),
        ("F", I(1)),
        ("G", I(0)),
    ];
    for (id, idx) in nodes.iter() {
        assert_eq!(tree.try_idx(id).unwrap(), *idx);
        assert_eq!(tree.by_id(id).unwrap().idx, *idx);
    }
    assert!(tree.try_idx("H").is_err());
    assert!(tree.by_id("H").is_none());
}

#[test]
fn structure_from_newick() {
    let tree = tree!("((A:1,B:1)I1:1,C:2)R;");
    assert_eq!(tree.len(), 5);
    assert_eq!(tree.n, 3);
    assert_eq!(tree.root, I(0));
    assert_eq!(tree.leaf_ids(), ["A", "B", "C"]);
    assert_eq!(tree.children(&I(0)), [I(1), L(4)]);
    assert_eq!(tree.children(&I(1)), [L(2), L(3)]);
    assert_eq!(tree.parent(&L(2)), Some(&I(1)));
    assert_eq!(tree.parent(&I(0)), None);
    assert!(tree.is_root(&I(0)));
    assert!(!tree.is_root(&I(1)));
    assert_eq!(tree.leaves().len(), 3);
    assert_eq!(tree.internals().len(), 2);
}

#[test]
fn traversal_orders() {
    let tree = tree!("((A:1,B:1)I1:1,C:2)R;");
    assert_eq!(tree.preorder, [I(0), I(1), L(2), L(3), L(4)]);
    assert_eq!(tree.postorder, [L(2), L(3), I(1), L(4), I(0)]);
    assert_eq!(tree.preorder_subroot(&I(1)), [I(1), L(2), L(3)]);
}

#[test]
fn heights_from_branch_lengths() {
    let tree = tree!("((A:1,B:1)I1:1,C:2)R;");
    assert_relative_eq!(tree.height, 2.0);
    assert_relative_eq!(tree.height(&I(0)), 2.0);
    assert_relative_eq!(tree.height(&I(1)), 1.0);
    for leaf in ["A", "B", "C"] {
        assert_relative_eq!(tree.height(&tree.try_idx(leaf).unwrap()), 0.0);
    }
}

#[test]
fn heights_non_ultrametric() {
    let tree = tree!("((A:0.5,B:1.5)I1:1,C:1)R;");
    assert_relative_eq!(tree.height, 2.5);
    assert_relative_eq!(tree.height(&tree.try_idx("A").unwrap()), 1.0);
    assert_relative_eq!(tree.height(&tree.try_idx("B").unwrap()), 0.0);
    assert_relative_eq!(tree.height(&tree.try_idx("C").unwrap()), 1.5);
    assert_relative_eq!(tree.height(&tree.try_idx("I1").unwrap()), 1.5);
}

#[test]
fn set_blen_updates_heights_and_dirty_flags() {
    let mut tree = tree!("((A:1,B:1)I1:1,C:2)R;");
    assert!(!tree.something_is_dirty());
    tree.set_blen(&I(1), 3.0).unwrap();
    assert_relative_eq!(tree.height, 4.0);
    assert_relative_eq!(tree.height(&I(1)), 1.0);
    assert_relative_eq!(tree.height(&L(4)), 2.0);
    assert!(tree.is_dirty(&I(1)));
    assert!(tree.is_dirty(&L(2)));
    assert!(tree.is_dirty(&L(3)));
    assert!(!tree.is_dirty(&L(4)));
    assert!(!tree.is_dirty(&I(0)));
    tree.clean();
    assert!(!tree.something_is_dirty());
    assert!(tree.set_blen(&I(1), -1.0).is_err());
}

#[rstest]
#[case::plain("((A:1,B:1)I1:1,C:2)R;", "((A:1,B:1)I1:1,C:2)R;")]
#[case::decimals("((A:1.5,B:0.25):2,C:3.75);", "((A:1.5,B:0.25):2,C:3.75);")]
#[case::quoted("(('A 1':1,\"B\":1)'I':1,C:2)R;", "((A 1:1,B:1)I:1,C:2)R;")]
#[case::comments("((A[&x=1]:1,B:1)I1[&y=2]:1,C:[&z]2)R;", "((A:1,B:1)I1:1,C:2)R;")]
#[case::scientific("(A:1e-1,B:1E1)R;", "(A:0.1,B:10)R;")]
#[case::single_leaf("A;", "A;")]
fn newick_round_trip(#[case] input: &str, #[case] expected: &str) {
    let tree = tree!(input);
    assert_eq!(tree.to_newick(), expected);
    assert_eq!(format!("{}", tree), expected);
}

#[test]
fn newick_annotations() {
    let tree = tree!("((A:1,B:1)I1:1,C:2)R;");
    let annotated = tree.to_newick_annotated(|idx| Some(format!("type=\"{}\"", usize::from(idx))));
    assert_eq!(
        annotated,
        "((A[&type=\"2\"]:1,B[&type=\"3\"]:1)I1[&type=\"1\"]:1,C[&type=\"4\"]:2)R[&type=\"0\"];"
    );
}

#[test]
fn multiple_trees() {
    let trees = from_newick("((A:1,B:1):1,C:2);\n(A:1,B:1);").unwrap();
    assert_eq!(trees.len(), 2);
    assert_eq!(trees[0].n, 3);
    assert_eq!(trees[1].n, 2);
}

#[rstest]
#[case::missing_semicolon("((A:1,B:1):1,C:2)")]
#[case::unbalanced("((A:1,B:1:1,C:2);")]
#[case::bad_blen("((A:1,B:x):1,C:2);")]
#[case::empty("")]
fn malformed_newick(#[case] input: &str) {
    let result = from_newick(input);
    assert!(result.is_err());
    assert!(result.unwrap_err().downcast_ref::<ParsingError>().is_some());
}

#[rstest]
#[case::trifurcation("(A:1,B:1,C:1);")]
#[case::unary("((A:1)I:1,B:2);")]
#[case::negative_blen("((A:-1,B:1):1,C:2);")]
fn unsupported_trees(#[case] input: &str) {
    let result = from_newick(input);
    assert!(result.is_err());
    assert!(result.unwrap_err().downcast_ref::<ParsingError>().is_some());
}

#[test]
fn deep_caterpillar_tree() {
    let n = 300;
    let mut newick = String::from("T0:1");
    for i in 1..n {
        newick = format!("({},T{}:{})", newick, i, i);
    }
    newick.push(';');
    let tree = tree!(&newick);
    assert_eq!(tree.n, n);
    assert_eq!(tree.len(), 2 * n - 1);
    assert_eq!(tree.preorder.len(), 2 * n - 1);
    assert_eq!(tree.postorder.last(), Some(&tree.root));
}
