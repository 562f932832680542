//! Implementations of the fittable unfolding models.
//!
//! Temperatures are in kelvin, energies in kJ/mol, rates in 1/min and the scan
//! rate in K/min.

use super::registry::{
    ENERGY_BOUNDS, GAS_CONSTANT as R, ModelContext, ModelKind, ShapeEstimate, Transitions,
    UnfoldingModel,
};

const MAX_EXPONENT: f64 = 700.0;
const INTEGRATION_SUBSTEPS: usize = 4;

#[inline]
fn safe_exp(x: f64) -> f64 {
    x.clamp(-MAX_EXPONENT, MAX_EXPONENT).exp()
}

#[inline]
fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[inline]
fn clamp_to(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        0.5 * (lo + hi)
    }
}

/// Running trapezoid integral of `rate` from the first temperature.
fn cumulative_integral(temperature: &[f64], rate: impl Fn(f64) -> f64) -> Vec<f64> {
    let mut integral = Vec::with_capacity(temperature.len());
    if temperature.is_empty() {
        return integral;
    }
    let mut accumulated = 0.0;
    integral.push(accumulated);
    for pair in temperature.windows(2) {
        let h = (pair[1] - pair[0]) / INTEGRATION_SUBSTEPS as f64;
        let mut previous = rate(pair[0]);
        for step in 1..=INTEGRATION_SUBSTEPS {
            let current = rate(pair[0] + h * step as f64);
            accumulated += 0.5 * h * (previous + current);
            previous = current;
        }
        integral.push(accumulated);
    }
    integral
}

/// Arrhenius rate constant that equals 1/min at `tf`.
#[inline]
fn arrhenius_rate(temperature: f64, tf: f64, ea: f64) -> f64 {
    safe_exp(-ea / R * (1.0 / temperature - 1.0 / tf))
}

fn guess_equilibrium(shape: &ShapeEstimate, context: &ModelContext) -> (f64, f64) {
    let tm = clamp_to(shape.midpoint, context.domain);
    let dhm = clamp_to(4.0 * R * tm * tm * shape.slope, ENERGY_BOUNDS);
    (tm, dhm)
}

fn guess_kinetic(shape: &ShapeEstimate, context: &ModelContext) -> (f64, f64) {
    let tm = clamp_to(shape.midpoint, context.domain);
    let ea = clamp_to(
        2.0 * shape.slope * R * tm * tm / std::f64::consts::LN_2,
        ENERGY_BOUNDS,
    );
    let rate_at_tm = context.scan_rate * std::f64::consts::LN_2 * ea / (R * tm * tm);
    let tf = 1.0 / (1.0 / tm + R * rate_at_tm.ln() / ea);
    (clamp_to(tf, context.domain), ea)
}

/// Two-state reversible unfolding with the Gibbs-Helmholtz temperature dependence
/// (Santoro and Bolen, 1988).
#[derive(Debug, Clone, Copy, Default)]
pub struct Santoro1988Model;

impl Santoro1988Model {
    pub fn gibbs_energy(tm: f64, dhm: f64, dcp: f64, temperature: f64) -> f64 {
        dhm * (1.0 - temperature / tm)
            - dcp * ((tm - temperature) + temperature * (temperature / tm).ln())
    }
}

impl UnfoldingModel for Santoro1988Model {
    fn kind(&self) -> ModelKind {
        ModelKind::Santoro1988
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["Tm", "dHm"]
    }

    fn initial_guess(&self, shape: &ShapeEstimate, context: &ModelContext) -> Vec<f64> {
        let (tm, dhm) = guess_equilibrium(shape, context);
        vec![tm, dhm]
    }

    fn bounds(&self, context: &ModelContext) -> Vec<(f64, f64)> {
        vec![context.domain, ENERGY_BOUNDS]
    }

    fn native_fraction(
        &self,
        params: &[f64],
        temperature: &[f64],
        context: &ModelContext,
    ) -> Vec<f64> {
        let (tm, dhm) = (params[0], params[1]);
        temperature
            .iter()
            .map(|&t| logistic(Self::gibbs_energy(tm, dhm, context.dcp, t) / (R * t)))
            .collect()
    }

    fn transitions(&self, params: &[f64]) -> Transitions {
        Transitions {
            tm: params[0],
            tf: f64::NAN,
        }
    }

    fn free_energy(&self, params: &[f64], temperature: f64, context: &ModelContext) -> Option<f64> {
        Some(Self::gibbs_energy(
            params[0],
            params[1],
            context.dcp,
            temperature,
        ))
    }

    fn residual_threshold(&self) -> f64 {
        0.05
    }
}

/// Irreversible first-order unfolding under a constant heating rate.
///
/// `Tf` is the temperature at which the rate constant reaches 1/min.
#[derive(Debug, Clone, Copy, Default)]
pub struct IrreversibleModel;

impl UnfoldingModel for IrreversibleModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Irrev
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["Tf", "Ea"]
    }

    fn initial_guess(&self, shape: &ShapeEstimate, context: &ModelContext) -> Vec<f64> {
        let (tf, ea) = guess_kinetic(shape, context);
        vec![tf, ea]
    }

    fn bounds(&self, context: &ModelContext) -> Vec<(f64, f64)> {
        vec![context.domain, ENERGY_BOUNDS]
    }

    fn native_fraction(
        &self,
        params: &[f64],
        temperature: &[f64],
        context: &ModelContext,
    ) -> Vec<f64> {
        let (tf, ea) = (params[0], params[1]);
        cumulative_integral(temperature, |t| arrhenius_rate(t, tf, ea))
            .into_iter()
            .map(|integral| (-integral / context.scan_rate).exp())
            .collect()
    }

    fn transitions(&self, params: &[f64]) -> Transitions {
        Transitions {
            tm: f64::NAN,
            tf: params[0],
        }
    }

    fn residual_threshold(&self) -> f64 {
        0.05
    }
}

/// Reversible unfolding followed by irreversible aggregation of the unfolded
/// state: N ⇌ U → A.
#[derive(Debug, Clone, Copy, Default)]
pub struct LumryEyringModel;

impl LumryEyringModel {
    /// Log of the unfolding equilibrium constant `[U]/[N]`.
    #[inline]
    fn log_equilibrium(tm: f64, dhm: f64, temperature: f64) -> f64 {
        dhm / R * (1.0 / tm - 1.0 / temperature)
    }

    /// Fraction of molecules not yet aggregated.
    fn reversible_pool(params: &[f64], temperature: &[f64], context: &ModelContext) -> Vec<f64> {
        let (tm, dhm, tf, ea) = (params[0], params[1], params[2], params[3]);
        cumulative_integral(temperature, |t| {
            arrhenius_rate(t, tf, ea) * logistic(Self::log_equilibrium(tm, dhm, t))
        })
        .into_iter()
        .map(|integral| (-integral / context.scan_rate).exp())
        .collect()
    }
}

impl UnfoldingModel for LumryEyringModel {
    fn kind(&self) -> ModelKind {
        ModelKind::LumryEyring
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["Tm", "dHm", "Tf", "Ea"]
    }

    fn initial_guess(&self, shape: &ShapeEstimate, context: &ModelContext) -> Vec<f64> {
        let (tm, dhm) = guess_equilibrium(shape, context);
        let (tf, ea) = guess_kinetic(shape, context);
        vec![tm, dhm, tf, ea]
    }

    fn bounds(&self, context: &ModelContext) -> Vec<(f64, f64)> {
        vec![context.domain, ENERGY_BOUNDS, context.domain, ENERGY_BOUNDS]
    }

    fn native_fraction(
        &self,
        params: &[f64],
        temperature: &[f64],
        context: &ModelContext,
    ) -> Vec<f64> {
        let (tm, dhm) = (params[0], params[1]);
        Self::reversible_pool(params, temperature, context)
            .into_iter()
            .zip(temperature)
            .map(|(pool, &t)| pool * logistic(-Self::log_equilibrium(tm, dhm, t)))
            .collect()
    }

    fn aggregated_fraction(
        &self,
        params: &[f64],
        temperature: &[f64],
        context: &ModelContext,
    ) -> Option<Vec<f64>> {
        Some(
            Self::reversible_pool(params, temperature, context)
                .into_iter()
                .map(|pool| 1.0 - pool)
                .collect(),
        )
    }

    fn transitions(&self, params: &[f64]) -> Transitions {
        Transitions {
            tm: params[0],
            tf: params[2],
        }
    }

    fn residual_threshold(&self) -> f64 {
        0.06
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn context() -> ModelContext {
        ModelContext {
            dcp: 0.0,
            scan_rate: 1.0,
            domain: (290.0, 360.0),
        }
    }

    fn grid() -> Vec<f64> {
        (0..=140).map(|i| 290.0 + 0.5 * i as f64).collect()
    }

    #[test]
    fn santoro_is_half_unfolded_at_tm() {
        let f = Santoro1988Model.native_fraction(&[320.0, 400.0], &[320.0], &context());
        assert!((f[0] - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn santoro_free_energy_vanishes_at_tm_for_any_dcp() {
        for dcp in [0.0, 5.0, 12.0] {
            assert!(Santoro1988Model::gibbs_energy(330.0, 500.0, dcp, 330.0).abs() < TOLERANCE);
        }
        assert!(Santoro1988Model::gibbs_energy(330.0, 500.0, 0.0, 298.15) > 0.0);
    }

    #[test]
    fn santoro_guess_inverts_midpoint_slope() {
        let shape = ShapeEstimate {
            midpoint: 320.0,
            slope: 400.0 / (4.0 * R * 320.0 * 320.0),
        };
        let guess = Santoro1988Model.initial_guess(&shape, &context());
        assert!((guess[0] - 320.0).abs() < TOLERANCE);
        assert!((guess[1] - 400.0).abs() < 1e-6);
    }

    #[test]
    fn irreversible_fraction_decays_monotonically() {
        let f = IrreversibleModel.native_fraction(&[330.0, 300.0], &grid(), &context());
        assert!((f[0] - 1.0).abs() < TOLERANCE);
        assert!(f.windows(2).all(|w| w[1] <= w[0] + TOLERANCE));
        assert!(*f.last().unwrap() < 1e-3);
    }

    #[test]
    fn irreversible_guess_lands_near_true_tf() {
        let params = [330.0, 300.0];
        let t = grid();
        let f = IrreversibleModel.native_fraction(&params, &t, &context());
        let idx = f.iter().position(|v| *v < 0.5).unwrap();
        let midpoint = t[idx];
        let slope = (f[idx - 1] - f[idx + 1]) / (t[idx + 1] - t[idx - 1]);
        let guess = IrreversibleModel.initial_guess(&ShapeEstimate { midpoint, slope }, &context());
        assert!((guess[0] - 330.0).abs() < 5.0);
        assert!((guess[1] - 300.0).abs() < 100.0);
    }

    #[test]
    fn lumry_eyring_populations_are_consistent() {
        let params = [325.0, 400.0, 335.0, 250.0];
        let t = grid();
        let native = LumryEyringModel.native_fraction(&params, &t, &context());
        let aggregated = LumryEyringModel
            .aggregated_fraction(&params, &t, &context())
            .unwrap();
        for (n, a) in native.iter().zip(&aggregated) {
            assert!(*n >= 0.0 && *n <= 1.0);
            assert!(*a >= -TOLERANCE && *a <= 1.0);
            assert!(n + a <= 1.0 + TOLERANCE);
        }
        assert!(aggregated.windows(2).all(|w| w[1] >= w[0] - TOLERANCE));
        assert!(*aggregated.last().unwrap() > 0.9);
    }

    #[test]
    fn extreme_parameters_do_not_produce_nan() {
        let f = IrreversibleModel.native_fraction(&[290.0, 3000.0], &grid(), &context());
        assert!(f.iter().all(|v| v.is_finite()));
        let g = LumryEyringModel.native_fraction(&[290.0, 3000.0, 290.0, 3000.0], &grid(), &context());
        assert!(g.iter().all(|v| v.is_finite()));
    }
}
