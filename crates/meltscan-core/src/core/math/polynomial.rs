//! Polynomial least squares on small dense systems.

use nalgebra::{DMatrix, DVector};

/// Solves a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }
    None
}

/// Fits `y ≈ c0 + c1 x + ... + cd x^d`, returning coefficients in ascending order.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Option<Vec<f64>> {
    if x.len() != y.len() || x.len() <= degree {
        return None;
    }
    let n = x.len();
    let design = DMatrix::from_fn(n, degree + 1, |i, j| x[i].powi(j as i32));
    let rhs = DVector::from_column_slice(y);
    solve_least_squares(&design, &rhs).map(|beta| beta.iter().copied().collect())
}

/// Evaluates a polynomial with ascending coefficients using Horner's scheme.
#[inline]
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}
