use std::error::Error;
use std::fmt;

use anyhow::bail;

use crate::substitution_models::SubstMatrix;
use crate::Result;

/// Below these values of `(alpha + beta) * t` the closed forms lose precision and are
/// replaced by their series expansions.
const SAME_TYPE_SERIES_THRESHOLD: f64 = 1e-3;
const SWITCH_SERIES_THRESHOLD: f64 = 1e-2;

#[derive(Debug, Clone, PartialEq)]
pub enum OccupancyError {
    InvalidState(usize),
    ForbiddenTransition { from: usize, to: usize },
    InvalidTime(f64),
    InvalidRateMatrix(String),
    NotANumber { parent: usize, child: usize, time: f64 },
}

impl fmt::Display for OccupancyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OccupancyError::InvalidState(state) => {
                write!(f, "Types should be either 0 or 1, not {}", state)
            }
            OccupancyError::ForbiddenTransition { from, to } => write!(
                f,
                "Switch from type {} to type {} is impossible, its rate is zero",
                from, to
            ),
            OccupancyError::InvalidTime(time) => {
                write!(f, "Branch time must be finite and non-negative, got {}", time)
            }
            OccupancyError::InvalidRateMatrix(message) => write!(f, "{}", message),
            OccupancyError::NotANumber {
                parent,
                child,
                time,
            } => write!(
                f,
                "Expected occupancy of a {} -> {} branch of time {} is not a number",
                parent, child, time
            ),
        }
    }
}

impl Error for OccupancyError {}

/// Expected fraction of a branch spent in each of the two types, conditioned on the
/// types at both ends.
///
/// With `alpha = Q[0][1]`, `beta = Q[1][0]`, `k = alpha + beta` and `e = exp(-k t)` the
/// expected time in type 0 is
/// * `0 -> 0`: `(b^2 t + 2ab/k (1 - e) + a^2 t e) / (k (b + a e))`
/// * `1 -> 1`: `(ab t - 2ab/k (1 - e) + ab t e) / (k (a + b e))`
/// * switch: `((b t - a t e) / (1 - e) + (a - b) / k) / k`
///
/// and `[p0, p1]` is that time divided by `t`.
///
/// # Errors
/// * [`OccupancyError::InvalidState`] for a type other than 0 or 1.
/// * [`OccupancyError::ForbiddenTransition`] if the ends differ but the rate of that
///   switch is zero, i.e. the branch has probability zero.
/// * [`OccupancyError::InvalidTime`] for a negative or non-finite time.
/// * [`OccupancyError::InvalidRateMatrix`] unless `q` is a 2x2 matrix with non-negative
///   off-diagonal rates.
/// * [`OccupancyError::NotANumber`] if the closed forms break down numerically.
///
/// # Example
/// ```
/// use nalgebra::dmatrix;
/// use tyche::occupancy::expected_occupancy;
///
/// let q = dmatrix![-0.5, 0.5; 0.5, -0.5];
/// let [p0, p1] = expected_occupancy(0, 1, 2.0, &q).unwrap();
/// assert!((p0 - 0.5).abs() < 1e-12);
/// assert!((p0 + p1 - 1.0).abs() < 1e-12);
/// ```
pub fn expected_occupancy(
    parent: usize,
    child: usize,
    time: f64,
    q: &SubstMatrix,
) -> Result<[f64; 2]> {
    for state in [parent, child] {
        if state > 1 {
            bail!(OccupancyError::InvalidState(state));
        }
    }
    if q.nrows() != 2 || q.ncols() != 2 {
        bail!(OccupancyError::InvalidRateMatrix(format!(
            "Expected occupancy needs a 2x2 rate matrix, got {}x{}",
            q.nrows(),
            q.ncols()
        )));
    }
    let (alpha, beta) = (q[(0, 1)], q[(1, 0)]);
    if !(alpha >= 0.0 && beta >= 0.0) || !alpha.is_finite() || !beta.is_finite() {
        bail!(OccupancyError::InvalidRateMatrix(format!(
            "Switching rates must be finite and non-negative, got {} and {}",
            alpha, beta
        )));
    }
    if !(time >= 0.0) || !time.is_finite() {
        bail!(OccupancyError::InvalidTime(time));
    }
    if parent != child && q[(parent, child)] == 0.0 {
        bail!(OccupancyError::ForbiddenTransition {
            from: parent,
            to: child
        });
    }

    let x = (alpha + beta) * time;
    let p0 = match (parent, child) {
        (0, 0) | (1, 1) if x < SAME_TYPE_SERIES_THRESHOLD => {
            same_type_series(parent, time, alpha, beta)
        }
        (0, 0) | (1, 1) => same_type_time_in_zero(parent, time, alpha, beta) / time,
        _ => switch_occupancy(alpha, beta, x),
    };
    if p0.is_nan() {
        bail!(OccupancyError::NotANumber {
            parent,
            child,
            time
        });
    }
    let p0 = p0.clamp(0.0, 1.0);
    Ok([p0, 1.0 - p0])
}

fn same_type_time_in_zero(state: usize, t: f64, alpha: f64, beta: f64) -> f64 {
    // without a way back the branch never left its type
    match state {
        0 if beta == 0.0 => return t,
        1 if alpha == 0.0 => return 0.0,
        _ => {}
    }
    let k = alpha + beta;
    let e = (-k * t).exp();
    let ab = alpha * beta;
    if state == 0 {
        (beta * beta * t + 2.0 * ab / k * (1.0 - e) + alpha * alpha * t * e)
            / (k * (beta + alpha * e))
    } else {
        (ab * t - 2.0 * ab / k * (1.0 - e) + ab * t * e) / (k * (alpha + beta * e))
    }
}

fn same_type_series(state: usize, t: f64, alpha: f64, beta: f64) -> f64 {
    let ab = alpha * beta;
    let second = ab * t * t / 6.0;
    let third = ab * (alpha - beta) * t.powi(3) / 12.0;
    let fourth = ab * (3.0 * alpha * alpha - 14.0 * ab + 3.0 * beta * beta) * t.powi(4) / 120.0;
    if state == 0 {
        1.0 - second - third - fourth
    } else {
        second - third + fourth
    }
}

/// Switch occupancy rewritten as `alpha/k + (beta - alpha)/k * h(x)` with
/// `h(x) = (x / (1 - exp(-x)) - 1) / x`, which is identical for both directions.
fn switch_occupancy(alpha: f64, beta: f64, x: f64) -> f64 {
    let k = alpha + beta;
    let h = if x < SWITCH_SERIES_THRESHOLD {
        0.5 + x / 12.0 - x.powi(3) / 720.0
    } else {
        (x / -(-x).exp_m1() - 1.0) / x
    };
    alpha / k + (beta - alpha) / k * h
}
