use std::error::Error as StdError;
use std::fmt;

use anyhow::Error;

pub mod alphabets;
pub mod asr;
pub mod branch_rates;
pub mod io;
pub mod likelihood;
pub mod macros;
pub mod occupancy;
pub mod parameters;
pub mod substitution_models;
pub mod tree;
pub mod type_info;

type Result<T> = std::result::Result<T, Error>;

/// Setup-time failure: inconsistent dimensions, unsupported domains or a model
/// that does not fit the data it is given.
pub struct ConfigError {
    pub(crate) message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Debug for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for ConfigError {}

pub fn assert_float_relative_slice_eq(actual: &[f64], expected: &[f64], epsilon: f64) {
    use approx::relative_eq;
    assert_eq!(
        actual.len(),
        expected.len(),
        "Must have the same number of entries."
    );
    for (i, (&act, &exp)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            relative_eq!(act, exp, epsilon = epsilon),
            "Entries at position {} do not match, actual: {}, expected: {}",
            i,
            act,
            exp,
        );
    }
}
