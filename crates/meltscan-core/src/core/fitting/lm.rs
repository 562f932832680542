//! Box-constrained Levenberg-Marquardt least squares.
//!
//! Steps are projected onto the feasible box, the damping uses Marquardt's
//! diagonal scaling so parameters of very different magnitude (kelvin,
//! kJ/mol, signal units) are treated evenly, and the Jacobian is obtained by
//! forward differences that flip direction at an upper bound.

use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmConfig {
    pub max_iterations: usize,
    /// Relative reduction of the cost below which the fit is considered converged.
    pub ftol: f64,
    /// Relative step size below which the fit is considered converged.
    pub xtol: f64,
    /// Infinity norm of the scaled gradient below which the fit is considered converged.
    pub gtol: f64,
    pub initial_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            initial_lambda: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    CostTolerance,
    StepTolerance,
    Gradient,
    /// No damped step reduces the cost any further.
    Stalled,
    MaxIterations,
    NonFinite,
}

impl Termination {
    pub fn converged(&self) -> bool {
        !matches!(self, Termination::MaxIterations | Termination::NonFinite)
    }
}

#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Sum of squared residuals.
    pub cost: f64,
    pub iterations: usize,
    pub termination: Termination,
    pub stderr: Vec<f64>,
}

const MAX_LAMBDA: f64 = 1e16;
const MIN_LAMBDA: f64 = 1e-15;
const DIAGONAL_FLOOR: f64 = 1e-12;

fn project(params: &mut DVector<f64>, bounds: &[(f64, f64)]) {
    for (value, &(lo, hi)) in params.iter_mut().zip(bounds) {
        *value = value.clamp(lo, hi);
    }
}

fn sum_of_squares(residuals: &[f64]) -> f64 {
    let cost: f64 = residuals.iter().map(|r| r * r).sum();
    if cost.is_finite() { cost } else { f64::INFINITY }
}

fn jacobian<F>(f: &F, params: &DVector<f64>, base: &[f64], bounds: &[(f64, f64)]) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let m = base.len();
    let n = params.len();
    let mut jac = DMatrix::zeros(m, n);
    let mut trial: Vec<f64> = params.iter().copied().collect();
    for j in 0..n {
        let original = trial[j];
        let mut h = f64::EPSILON.sqrt() * original.abs().max(1.0);
        if original + h > bounds[j].1 {
            h = -h;
        }
        trial[j] = original + h;
        let shifted = f(&trial);
        trial[j] = original;
        for i in 0..m {
            let d = (shifted[i] - base[i]) / h;
            jac[(i, j)] = if d.is_finite() { d } else { 0.0 };
        }
    }
    jac
}

fn solve_damped(jtj: &DMatrix<f64>, gradient: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let mut system = jtj.clone();
    for i in 0..system.nrows() {
        system[(i, i)] += lambda * jtj[(i, i)].max(DIAGONAL_FLOOR);
    }
    let rhs = -gradient;
    if let Some(chol) = system.clone().cholesky() {
        return Some(chol.solve(&rhs));
    }
    system.svd(true, true).solve(&rhs, 1e-12).ok()
}

/// Standard errors from `(JᵀJ)⁺ · SSE / (m - n)`.
fn standard_errors(jac: &DMatrix<f64>, cost: f64) -> Vec<f64> {
    let (m, n) = jac.shape();
    if m <= n {
        return vec![f64::NAN; n];
    }
    let variance = cost / (m - n) as f64;
    match (jac.transpose() * jac).pseudo_inverse(1e-12) {
        Ok(cov) => (0..n)
            .map(|i| {
                let v = cov[(i, i)] * variance;
                if v.is_finite() && v >= 0.0 { v.sqrt() } else { f64::NAN }
            })
            .collect(),
        Err(_) => vec![f64::NAN; n],
    }
}

/// Minimizes `Σ f(p)_i²` subject to `bounds[j].0 <= p_j <= bounds[j].1`.
///
/// Unbounded parameters use infinite bounds.
pub fn minimize<F>(f: F, initial: &[f64], bounds: &[(f64, f64)], config: &LmConfig) -> LmOutcome
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    debug_assert_eq!(initial.len(), bounds.len());
    let mut params = DVector::from_column_slice(initial);
    project(&mut params, bounds);
    let mut residuals = f(params.as_slice());
    let mut cost = sum_of_squares(&residuals);
    let mut lambda = config.initial_lambda;
    let mut iterations = 0;

    let termination = if !cost.is_finite() {
        Termination::NonFinite
    } else {
        loop {
            if iterations >= config.max_iterations {
                break Termination::MaxIterations;
            }
            iterations += 1;

            let jac = jacobian(&f, &params, &residuals, bounds);
            let r = DVector::from_column_slice(&residuals);
            let gradient = jac.transpose() * &r;
            let jtj = jac.transpose() * &jac;

            let scaled_gradient = (0..params.len())
                .map(|j| gradient[j].abs() / jtj[(j, j)].max(DIAGONAL_FLOOR).sqrt())
                .fold(0.0, f64::max);
            if scaled_gradient <= config.gtol * cost.sqrt().max(f64::MIN_POSITIVE) {
                break Termination::Gradient;
            }

            let mut accepted = None;
            while lambda <= MAX_LAMBDA {
                let Some(delta) = solve_damped(&jtj, &gradient, lambda) else {
                    lambda *= 10.0;
                    continue;
                };
                let mut candidate = &params + &delta;
                project(&mut candidate, bounds);
                let candidate_residuals = f(candidate.as_slice());
                let candidate_cost = sum_of_squares(&candidate_residuals);
                if candidate_cost < cost {
                    lambda = (lambda / 10.0).max(MIN_LAMBDA);
                    accepted = Some((candidate, candidate_residuals, candidate_cost));
                    break;
                }
                lambda *= 10.0;
            }

            let Some((candidate, candidate_residuals, candidate_cost)) = accepted else {
                break Termination::Stalled;
            };
            let step = (&candidate - &params).norm();
            let reduction = cost - candidate_cost;
            params = candidate;
            residuals = candidate_residuals;
            let previous_cost = cost;
            cost = candidate_cost;

            if reduction <= config.ftol * previous_cost {
                break Termination::CostTolerance;
            }
            if step <= config.xtol * (params.norm() + config.xtol) {
                break Termination::StepTolerance;
            }
        }
    };

    let stderr = if cost.is_finite() {
        let jac = jacobian(&f, &params, &residuals, bounds);
        standard_errors(&jac, cost)
    } else {
        vec![f64::NAN; params.len()]
    };

    LmOutcome {
        params: params.iter().copied().collect(),
        residuals,
        cost,
        iterations,
        termination,
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNBOUNDED: (f64, f64) = (f64::NEG_INFINITY, f64::INFINITY);

    #[test]
    fn fits_exponential_decay() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * (-0.7 * v).exp() + 0.5).collect();
        let residuals = |p: &[f64]| -> Vec<f64> {
            x.iter()
                .zip(&y)
                .map(|(xi, yi)| p[0] * (-p[1] * xi).exp() + p[2] - yi)
                .collect()
        };
        let outcome = minimize(
            residuals,
            &[1.0, 0.1, 0.0],
            &[UNBOUNDED; 3],
            &LmConfig::default(),
        );
        assert!(outcome.termination.converged());
        assert!((outcome.params[0] - 3.0).abs() < 1e-6);
        assert!((outcome.params[1] - 0.7).abs() < 1e-6);
        assert!((outcome.params[2] - 0.5).abs() < 1e-6);
        assert!(outcome.cost < 1e-12);
    }

    #[test]
    fn respects_bounds_and_pins_to_the_active_one() {
        // unconstrained optimum is p = 5, the box stops at 2
        let residuals = |p: &[f64]| vec![p[0] - 5.0];
        let outcome = minimize(residuals, &[0.0], &[(-1.0, 2.0)], &LmConfig::default());
        assert!(outcome.termination.converged());
        assert!((outcome.params[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn initial_guess_outside_box_is_projected() {
        let residuals = |p: &[f64]| vec![p[0] - 1.5];
        let outcome = minimize(residuals, &[10.0], &[(0.0, 3.0)], &LmConfig::default());
        assert!((outcome.params[0] - 1.5).abs() < 1e-8);
    }

    #[test]
    fn standard_errors_follow_residual_variance() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let noise = [0.1, -0.1];
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| 2.0 * v + 1.0 + noise[i % 2])
            .collect();
        let residuals = |p: &[f64]| -> Vec<f64> {
            x.iter().zip(&y).map(|(xi, yi)| p[0] * xi + p[1] - yi).collect()
        };
        let outcome = minimize(residuals, &[0.0, 0.0], &[UNBOUNDED; 2], &LmConfig::default());
        assert!(outcome.stderr.iter().all(|s| s.is_finite() && *s > 0.0));
        assert!(outcome.stderr[0] < 0.05);
    }

    #[test]
    fn iteration_cap_is_reported_as_non_convergence() {
        let config = LmConfig {
            max_iterations: 1,
            ..LmConfig::default()
        };
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let residuals = |p: &[f64]| -> Vec<f64> {
            x.iter().map(|xi| p[0] * (-p[1] * xi).exp() - 3.0 * (-0.7 * xi).exp()).collect()
        };
        let outcome = minimize(residuals, &[1.0, 3.0], &[UNBOUNDED; 2], &config);
        assert_eq!(outcome.termination, Termination::MaxIterations);
        assert!(!outcome.termination.converged());
    }
}
