//! Linear algebra helpers for the Kalman gain.
//!
//! Public API:
//!     pub fn symmetrize(m: &Matrix6<f64>) -> Matrix6<f64>
//!     pub fn chol_solve_spd(a, b, opt) -> Option<Matrix6<f64>>
//!     pub fn robust_spd_solve(a, b) -> Option<Matrix6<f64>>
//!
//! Strategy:
//! 1) Symmetrize A ← 0.5 (A + Aᵀ)
//! 2) Cholesky
//! 3) Jittered Cholesky (geometric ramp)
//! 4) Explicit inverse
//!
//! The innovation covariance of the estimator is always 6×6, so everything here works on
//! nalgebra's stack-allocated `Matrix6`.

use nalgebra::Matrix6;
use nalgebra::linalg::Cholesky;

/// Simple matrix symmetrization that removes round-off asymmetry.
#[inline]
pub fn symmetrize(m: &Matrix6<f64>) -> Matrix6<f64> {
    0.5 * (m + m.transpose())
}

#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    pub initial_jitter: f64, // e.g., 1e-12
    pub max_jitter: f64,     // e.g., 1e-6
    pub max_tries: usize,    // e.g., 6
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            initial_jitter: 1e-12,
            max_jitter: 1e-6,
            max_tries: 6,
        }
    }
}

/// Solve A X = B for SPD-ish A via Cholesky, with jitter retries.
/// Returns None if all attempts fail.
pub fn chol_solve_spd(
    a: &Matrix6<f64>,
    b: &Matrix6<f64>,
    opt: SolveOptions,
) -> Option<Matrix6<f64>> {
    let a_sym = symmetrize(a);
    if let Some(ch) = Cholesky::new(a_sym) {
        return Some(ch.solve(b));
    }

    let mut jitter = opt.initial_jitter;
    for _ in 0..opt.max_tries {
        let a_j = a_sym + Matrix6::identity() * jitter;
        if let Some(ch) = Cholesky::new(a_j) {
            return Some(ch.solve(b));
        }
        jitter *= 10.0;
        if jitter > opt.max_jitter {
            break;
        }
    }
    None
}

/// Robust SPD solve with sane defaults:
/// - Cholesky + jitter (preferred)
/// - Last resort: explicit inverse
///
/// Returns `None` when A cannot be inverted at all, or when the solution is not finite.
pub fn robust_spd_solve(a: &Matrix6<f64>, b: &Matrix6<f64>) -> Option<Matrix6<f64>> {
    let solution = chol_solve_spd(a, b, SolveOptions::default())
        .or_else(|| symmetrize(a).try_inverse().map(|inv| inv * b))?;
    solution.iter().all(|v| v.is_finite()).then_some(solution)
}
