use std::fmt::{Debug, Display};

use anyhow::bail;
use fixedbitset::FixedBitSet;

use crate::{ConfigError, Result};

/// A named, bounded, multi-dimensional value with a single-slot backup for MCMC
/// style store/restore. Writes mark the touched dimension as dirty until the
/// state is accepted or restored.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter<T> {
    id: String,
    values: Vec<T>,
    stored: Vec<T>,
    lower: T,
    upper: T,
    dirty: FixedBitSet,
}

pub type RealParameter = Parameter<f64>;
pub type IntegerParameter = Parameter<usize>;

impl<T> Parameter<T>
where
    T: Copy + PartialOrd + Display + Debug,
{
    /// Creates a parameter, failing if any value lies outside `[lower, upper]`.
    pub fn new(id: &str, values: &[T], lower: T, upper: T) -> Result<Self> {
        if lower > upper {
            bail!(ConfigError::new(format!(
                "Parameter {} has lower bound {} above upper bound {}",
                id, lower, upper
            )));
        }
        if let Some(v) = values.iter().find(|v| !(**v >= lower && **v <= upper)) {
            bail!(ConfigError::new(format!(
                "Parameter {} value {} is outside of its bounds [{}, {}]",
                id, v, lower, upper
            )));
        }
        Ok(Self {
            id: id.to_string(),
            values: values.to_vec(),
            stored: values.to_vec(),
            lower,
            upper,
            dirty: FixedBitSet::with_capacity(values.len()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, i: usize) -> T {
        self.values[i]
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn stored_value(&self, i: usize) -> T {
        self.stored[i]
    }

    pub fn lower(&self) -> T {
        self.lower
    }

    pub fn upper(&self) -> T {
        self.upper
    }

    pub fn set_bounds(&mut self, lower: T, upper: T) -> Result<()> {
        let checked = Self::new(&self.id, &self.values, lower, upper)?;
        self.lower = checked.lower;
        self.upper = checked.upper;
        Ok(())
    }

    pub fn set_value(&mut self, i: usize, value: T) -> Result<()> {
        if i >= self.values.len() {
            bail!(
                "Index {} out of range for parameter {} of dimension {}",
                i,
                self.id,
                self.values.len()
            );
        }
        if !(value >= self.lower && value <= self.upper) {
            bail!(
                "Value {} is outside of the bounds [{}, {}] of parameter {}",
                value,
                self.lower,
                self.upper,
                self.id
            );
        }
        self.values[i] = value;
        self.dirty.insert(i);
        Ok(())
    }

    pub fn is_dirty(&self, i: usize) -> bool {
        self.dirty.contains(i)
    }

    pub fn something_is_dirty(&self) -> bool {
        !self.dirty.is_clear()
    }

    pub fn store(&mut self) {
        self.stored.copy_from_slice(&self.values);
    }

    pub fn restore(&mut self) {
        self.values.copy_from_slice(&self.stored);
        self.dirty.clear();
    }

    pub fn accept(&mut self) {
        self.dirty.clear();
    }
}

impl RealParameter {
    pub fn unbounded(id: &str, values: &[f64]) -> Result<Self> {
        Self::new(id, values, f64::NEG_INFINITY, f64::INFINITY)
    }
}
