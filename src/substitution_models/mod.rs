use anyhow::bail;
use log::{info, warn};
use nalgebra::{DMatrix, DVector};

use crate::{ConfigError, Result};

pub type SubstMatrix = DMatrix<f64>;
pub type FreqVector = DVector<f64>;

const GENERATOR_TOLERANCE: f64 = 1e-8;

/// Continuous time Markov chain over discrete types.
///
/// Holds the generator `Q` (rows are the start state), the root frequencies and an
/// optional set of rate indicators. A rate whose indicator is off is fixed to zero in
/// `Q` and its transition probability is forced to exactly zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSubstModel {
    q: SubstMatrix,
    stored_q: SubstMatrix,
    freqs: FreqVector,
    stored_freqs: FreqVector,
    indicators: Option<Vec<bool>>,
}

impl TypeSubstModel {
    pub fn new(q: SubstMatrix, freqs: FreqVector) -> Result<Self> {
        validate_generator(&q)?;
        validate_freqs(&freqs, q.nrows())?;
        info!("Set up a {}-state type substitution model", q.nrows());
        Ok(Self {
            stored_q: q.clone(),
            q,
            stored_freqs: freqs.clone(),
            freqs,
            indicators: None,
        })
    }

    /// Builds the generator from the off-diagonal rates given row by row, i.e.
    /// `[q01, q02, ..., q10, q12, ...]`; the diagonal is set so that rows sum to zero.
    pub fn from_rates(n: usize, rates: &[f64], freqs: &[f64]) -> Result<Self> {
        if n == 0 || rates.len() != n * (n - 1) {
            bail!(ConfigError::new(format!(
                "A {}-state model needs {} off-diagonal rates, got {}",
                n,
                n * n.saturating_sub(1),
                rates.len()
            )));
        }
        let mut q = SubstMatrix::zeros(n, n);
        let mut rates = rates.iter();
        for i in 0..n {
            for j in (0..n).filter(|j| *j != i) {
                q[(i, j)] = rates.next().copied().unwrap_or_default();
            }
        }
        fix_diagonal(&mut q);
        Self::new(q, FreqVector::from_column_slice(freqs))
    }

    /// Two-state model with `alpha = Q[0][1]`, `beta = Q[1][0]` and stationary root
    /// frequencies.
    pub fn two_state(alpha: f64, beta: f64) -> Result<Self> {
        let k = alpha + beta;
        let freqs = if k > 0.0 {
            [beta / k, alpha / k]
        } else {
            [0.5, 0.5]
        };
        Self::from_rates(2, &[alpha, beta], &freqs)
    }

    /// Switches rates on or off, one indicator per off-diagonal entry in the same row-major
    /// order as [`TypeSubstModel::from_rates`].
    pub fn with_rate_indicators(mut self, indicators: &[bool]) -> Result<Self> {
        let n = self.n();
        if indicators.len() != n * (n - 1) {
            bail!(ConfigError::new(format!(
                "Rate indicator dimension {} does not match the {} off-diagonal rates",
                indicators.len(),
                n * (n - 1)
            )));
        }
        let mut mask = vec![true; n * n];
        let mut indicators = indicators.iter();
        for i in 0..n {
            for j in (0..n).filter(|j| *j != i) {
                let on = indicators.next().copied().unwrap_or(true);
                mask[i * n + j] = on;
                if !on {
                    self.q[(i, j)] = 0.0;
                }
            }
        }
        fix_diagonal(&mut self.q);
        self.stored_q.copy_from(&self.q);
        self.indicators = Some(mask);
        Ok(self)
    }

    pub fn n(&self) -> usize {
        self.q.nrows()
    }

    pub fn q(&self) -> &SubstMatrix {
        &self.q
    }

    pub fn freqs(&self) -> &FreqVector {
        &self.freqs
    }

    pub fn rate(&self, i: usize, j: usize) -> f64 {
        self.q[(i, j)]
    }

    pub fn rate_indicator(&self, i: usize, j: usize) -> bool {
        match &self.indicators {
            Some(mask) => mask[i * self.n() + j],
            None => true,
        }
    }

    pub fn set_rate(&mut self, i: usize, j: usize, rate: f64) -> Result<()> {
        if i == j || i >= self.n() || j >= self.n() {
            bail!("Invalid off-diagonal entry ({}, {})", i, j);
        }
        if !rate.is_finite() || rate < 0.0 {
            bail!("Rates must be finite and non-negative, got {}", rate);
        }
        if !self.rate_indicator(i, j) && rate != 0.0 {
            bail!("Rate ({}, {}) is switched off and must stay zero", i, j);
        }
        self.q[(i, j)] = rate;
        fix_diagonal(&mut self.q);
        Ok(())
    }

    pub fn set_freqs(&mut self, freqs: &[f64]) -> Result<()> {
        let freqs = FreqVector::from_column_slice(freqs);
        validate_freqs(&freqs, self.n())?;
        self.freqs = freqs;
        Ok(())
    }

    /// True if any off-diagonal rate is exactly zero.
    pub fn has_forbidden_transition(&self) -> bool {
        let n = self.n();
        (0..n).any(|i| (0..n).any(|j| i != j && self.q[(i, j)] == 0.0))
    }

    pub fn p(&self, time: f64) -> SubstMatrix {
        (self.q.clone() * time).exp()
    }

    /// Transition probabilities between two heights at the given clock rate, rows being
    /// the state at the older end.
    pub fn transition_probabilities(&self, start: f64, end: f64, rate: f64) -> SubstMatrix {
        let mut p = self.p((start - end).abs() * rate);
        if let Some(mask) = &self.indicators {
            let n = self.n();
            for (idx, on) in mask.iter().enumerate() {
                if *on {
                    continue;
                }
                let (i, j) = (idx / n, idx % n);
                if p[(i, j)].abs() > f64::EPSILON {
                    warn!(
                        "Non-zero probability {} for switched off transition {} -> {}",
                        p[(i, j)],
                        i,
                        j
                    );
                }
                p[(i, j)] = 0.0;
            }
        }
        p
    }

    pub fn store(&mut self) {
        self.stored_q.copy_from(&self.q);
        self.stored_freqs.copy_from(&self.freqs);
    }

    pub fn restore(&mut self) {
        self.q.copy_from(&self.stored_q);
        self.freqs.copy_from(&self.stored_freqs);
    }
}

fn fix_diagonal(q: &mut SubstMatrix) {
    for i in 0..q.nrows() {
        q[(i, i)] = 0.0;
        let row_sum = q.row(i).sum();
        q[(i, i)] = -row_sum;
    }
}

pub(crate) fn validate_generator(q: &SubstMatrix) -> Result<()> {
    if q.nrows() == 0 || q.nrows() != q.ncols() {
        bail!(ConfigError::new(format!(
            "Rate matrix must be square and non-empty, got {}x{}",
            q.nrows(),
            q.ncols()
        )));
    }
    for i in 0..q.nrows() {
        for j in 0..q.ncols() {
            if !q[(i, j)].is_finite() || (i != j && q[(i, j)] < 0.0) {
                bail!(ConfigError::new(format!(
                    "Invalid rate {} at ({}, {})",
                    q[(i, j)],
                    i,
                    j
                )));
            }
        }
        let scale = q.row(i).abs().max().max(1.0);
        if q.row(i).sum().abs() > GENERATOR_TOLERANCE * scale {
            bail!(ConfigError::new(format!(
                "Row {} of the rate matrix does not sum to zero",
                i
            )));
        }
    }
    Ok(())
}

fn validate_freqs(freqs: &FreqVector, n: usize) -> Result<()> {
    if freqs.len() != n {
        bail!(ConfigError::new(format!(
            "Expected {} root frequencies, got {}",
            n,
            freqs.len()
        )));
    }
    if freqs.iter().any(|f| !f.is_finite() || *f < 0.0)
        || (freqs.sum() - 1.0).abs() > GENERATOR_TOLERANCE
    {
        bail!(ConfigError::new(format!(
            "Root frequencies must be non-negative and sum to 1, got {:?}",
            freqs.as_slice()
        )));
    }
    Ok(())
}
