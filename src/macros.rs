#[macro_export]
macro_rules! tree {
    ($e:expr) => {{
        use $crate::tree::tree_parser::from_newick;
        from_newick($e).unwrap().pop().unwrap()
    }};
}

#[macro_export]
macro_rules! frequencies {
    ($slice:expr) => {{
        use $crate::substitution_models::FreqVector;
        FreqVector::from_column_slice($slice)
    }};
}

/// Builds a `TypeInfo` from a newick string and a `taxon=code,...` trait string
/// over the binary alphabet. Panics on invalid input, intended for tests and benches.
#[macro_export]
macro_rules! binary_info {
    ($newick:expr, $traits:expr) => {{
        use $crate::alphabets::TypeAlphabet;
        use $crate::type_info::TypeInfoBuilder;
        TypeInfoBuilder::new($crate::tree!($newick), TypeAlphabet::binary())
            .trait_string($traits)
            .build()
            .unwrap()
    }};
}
