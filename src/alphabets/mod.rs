use std::fmt::{self, Display};

use anyhow::bail;
use hashbrown::HashMap;
use itertools::join;

use crate::io::DataError;
use crate::substitution_models::FreqVector;
use crate::{ConfigError, Result};

pub static MISSING_CODES: [&str; 2] = ["?", "-"];

/// Discrete trait alphabet. Each state has one code; further codes stand for sets of
/// states (ambiguous observations). The missing data codes `?` and `-` always map to
/// every state.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAlphabet {
    codes: Vec<String>,
    sets: HashMap<String, Vec<usize>>,
    delimited: bool,
}

impl Display for TypeAlphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type alphabet with {} states: {}",
            self.codes.len(),
            join(&self.codes, ", ")
        )
    }
}

impl TypeAlphabet {
    /// User defined alphabet with one multi-character code per state. States are
    /// formatted space delimited.
    pub fn user(codes: &[&str]) -> Result<Self> {
        Self::with_codes(codes.iter().map(|c| c.to_string()).collect(), true)
    }

    pub fn binary() -> Self {
        Self {
            codes: vec!["0".to_string(), "1".to_string()],
            sets: Self::missing_sets(2),
            delimited: true,
        }
    }

    /// Single character alphabet, e.g. `"ACGT"`; formatted states are not delimited.
    pub fn characters(symbols: &str) -> Result<Self> {
        Self::with_codes(symbols.chars().map(|c| c.to_string()).collect(), false)
    }

    /// Parses a code map such as `"A=0,B=1,AB=0 1,?=0 1"`. Codes mapping to a single
    /// state define the states, codes mapping to several states are ambiguities.
    pub fn from_code_map(code_map: &str) -> Result<Self> {
        let mut singles: Vec<(usize, String)> = Vec::new();
        let mut multi: Vec<(String, Vec<usize>)> = Vec::new();
        for entry in code_map.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((code, states)) = entry.split_once('=') else {
                bail!(ConfigError::new(format!(
                    "Code map entry '{}' is not of the form code=states",
                    entry
                )));
            };
            let states = states
                .split_whitespace()
                .map(|s| s.parse::<usize>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| {
                    ConfigError::new(format!("Code map entry '{}' has invalid states", entry))
                })?;
            match states.as_slice() {
                [] => bail!(ConfigError::new(format!(
                    "Code map entry '{}' has no states",
                    entry
                ))),
                [state] => singles.push((*state, code.trim().to_string())),
                _ => multi.push((code.trim().to_string(), states)),
            }
        }
        singles.sort();
        if singles.iter().enumerate().any(|(i, (state, _))| i != *state) {
            bail!(ConfigError::new(format!(
                "Code map '{}' must give exactly one code to each of the states 0..K-1",
                code_map
            )));
        }
        let mut alphabet = Self::with_codes(singles.into_iter().map(|(_, c)| c).collect(), true)?;
        for (code, states) in multi {
            if let Some(state) = states.iter().find(|s| **s >= alphabet.state_count()) {
                bail!(ConfigError::new(format!(
                    "Ambiguity code {} refers to unknown state {}",
                    code, state
                )));
            }
            alphabet.sets.insert(code, states);
        }
        Ok(alphabet)
    }

    fn with_codes(codes: Vec<String>, delimited: bool) -> Result<Self> {
        if codes.is_empty() {
            bail!(ConfigError::new("Type alphabet must have at least one state"));
        }
        for (i, code) in codes.iter().enumerate() {
            if code.is_empty() || MISSING_CODES.contains(&code.as_str()) {
                bail!(ConfigError::new(format!("Invalid type code '{}'", code)));
            }
            if codes[..i].contains(code) {
                bail!(ConfigError::new(format!("Duplicate type code '{}'", code)));
            }
        }
        Ok(Self {
            sets: Self::missing_sets(codes.len()),
            codes,
            delimited,
        })
    }

    fn missing_sets(state_count: usize) -> HashMap<String, Vec<usize>> {
        MISSING_CODES
            .iter()
            .map(|code| (code.to_string(), (0..state_count).collect()))
            .collect()
    }

    pub fn state_count(&self) -> usize {
        self.codes.len()
    }

    pub fn code(&self, state: usize) -> &str {
        &self.codes[state]
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn is_delimited(&self) -> bool {
        self.delimited
    }

    /// States compatible with an observed code.
    pub fn state_set(&self, code: &str) -> Result<Vec<usize>> {
        let code = code.trim();
        if let Some(state) = self.codes.iter().position(|c| c == code) {
            return Ok(vec![state]);
        }
        match self.sets.get(code) {
            Some(states) => Ok(states.clone()),
            None => bail!(DataError {
                message: format!("Unknown type code '{}'", code)
            }),
        }
    }

    pub fn is_ambiguous(&self, code: &str) -> bool {
        !self.codes.iter().any(|c| c == code.trim())
    }

    /// Indicator vector of the states compatible with an observed code.
    pub fn encoding(&self, code: &str) -> Result<FreqVector> {
        let mut encoding = FreqVector::zeros(self.state_count());
        for state in self.state_set(code)? {
            encoding[state] = 1.0;
        }
        Ok(encoding)
    }

    pub fn format_states(&self, states: &[usize]) -> String {
        let separator = if self.delimited { " " } else { "" };
        join(states.iter().map(|s| self.code(*s)), separator)
    }
}
