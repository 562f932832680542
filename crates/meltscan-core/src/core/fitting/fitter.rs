use super::lm::{self, LmConfig};
use super::registry::{
    ModelContext, ModelKind, STANDARD_TEMPERATURE, ShapeEstimate, UnfoldingModel,
};
use super::score::{ScoringStrategy, normalized_rmse};
use crate::core::math::polynomial::{polyfit, polyval};
use crate::core::models::curve::Curve;
use crate::core::models::results::{
    DerivedMetrics, FitFailure, FitResult, FitStatus, FittedParameter,
};
use crate::core::models::settings::BaselineBounds;
use crate::core::models::well::WellId;
use tracing::debug;

const METRIC_GRID_STEP: f64 = 0.05;
const SLOPE_WINDOW: f64 = 3.0;
const SMOOTHING_POINTS: usize = 5;
const MIN_FIT_POINTS: usize = 10;

/// Everything a single-well fit needs besides the curve and the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub dcp: Option<f64>,
    pub baseline_degree: usize,
    pub baseline_bounds: BaselineBounds,
    pub scan_rate: f64,
    pub onset_threshold: f64,
    pub aggregation_threshold: f64,
    pub reference_temperature: f64,
    pub lm: LmConfig,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            dcp: None,
            baseline_degree: 1,
            baseline_bounds: BaselineBounds::default(),
            scan_rate: 1.0,
            onset_threshold: 0.01,
            aggregation_threshold: 0.5,
            reference_temperature: STANDARD_TEMPERATURE,
            lm: LmConfig::default(),
        }
    }
}

/// Fits one unfolding model to one well.
pub struct WellFitter<'a> {
    scoring: &'a dyn ScoringStrategy,
}

struct Prepared<'c> {
    curve: &'c Curve,
    x: Vec<f64>,
    center: f64,
    context: ModelContext,
}

impl<'c> Prepared<'c> {
    fn predict(&self, model: &dyn UnfoldingModel, params: &[f64], n_base: usize) -> Vec<f64> {
        let n_model = model.parameter_names().len();
        let pre = &params[n_model..n_model + n_base];
        let post = &params[n_model + n_base..n_model + 2 * n_base];
        model
            .native_fraction(&params[..n_model], &self.curve.temperature, &self.context)
            .into_iter()
            .zip(&self.x)
            .map(|(f_native, &x)| f_native * polyval(pre, x) + (1.0 - f_native) * polyval(post, x))
            .collect()
    }
}

impl<'a> WellFitter<'a> {
    pub fn new(scoring: &'a dyn ScoringStrategy) -> Self {
        Self { scoring }
    }

    pub fn fit(
        &self,
        well: WellId,
        curve: &Curve,
        kind: ModelKind,
        options: &FitOptions,
    ) -> FitResult {
        let Some(model) = kind.model() else {
            return FitResult::empty(well, kind, FitStatus::Skipped);
        };
        let names = model.parameter_names();
        let degree = options.baseline_degree;
        let n_base = degree + 1;
        let n_params = names.len() + 2 * n_base;
        let n = curve.len();

        let Some(domain) = curve.domain() else {
            return failed(well, kind, names, degree, FitFailure::InsufficientData);
        };
        if n < (2 * n_params).max(MIN_FIT_POINTS) {
            return failed(well, kind, names, degree, FitFailure::InsufficientData);
        }

        let center = 0.5 * (domain.0 + domain.1);
        let prepared = Prepared {
            curve,
            x: curve.temperature.iter().map(|t| t - center).collect(),
            center,
            context: ModelContext {
                dcp: options.dcp.unwrap_or(0.0),
                scan_rate: options.scan_rate,
                domain,
            },
        };

        let window = options
            .baseline_bounds
            .window_len(n)
            .clamp(degree + 2, n / 2);
        let (Some(pre), Some(post)) = (
            polyfit(&prepared.x[..window], &curve.signal[..window], degree),
            polyfit(&prepared.x[n - window..], &curve.signal[n - window..], degree),
        ) else {
            return failed(well, kind, names, degree, FitFailure::NonConvergence);
        };

        let unfolded = normalize(&prepared.x, &curve.signal, &pre, &post);
        let shape = estimate_shape(&curve.temperature, &unfolded, domain);

        let mut initial = model.initial_guess(&shape, &prepared.context);
        initial.extend_from_slice(&pre);
        initial.extend_from_slice(&post);
        let mut bounds = model.bounds(&prepared.context);
        bounds.extend(std::iter::repeat_n(
            (f64::NEG_INFINITY, f64::INFINITY),
            2 * n_base,
        ));

        let outcome = lm::minimize(
            |p| {
                prepared
                    .predict(model, p, n_base)
                    .into_iter()
                    .zip(&curve.signal)
                    .map(|(predicted, observed)| predicted - observed)
                    .collect()
            },
            &initial,
            &bounds,
            &options.lm,
        );

        let predicted = prepared.predict(model, &outcome.params, n_base);
        let nrmse = normalized_rmse(&curve.signal, &predicted);
        if let Some(failure) = classify(
            outcome.termination.converged(),
            nrmse,
            model.residual_threshold(),
            &outcome.params[..names.len()],
            &bounds[..names.len()],
        ) {
            debug!(
                well = %well,
                model = %kind,
                iterations = outcome.iterations,
                nrmse,
                "Fit rejected: {}",
                failure
            );
            return failed(well, kind, names, degree, failure);
        }

        let parameters = parameter_labels(names, degree)
            .into_iter()
            .zip(outcome.params.iter().zip(&outcome.stderr))
            .map(|(name, (&value, &stderr))| FittedParameter {
                name,
                value,
                stderr,
            })
            .collect();

        let model_params = &outcome.params[..names.len()];
        let metrics = derive_metrics(
            model,
            model_params,
            &prepared.context,
            options,
            self.scoring.score(&curve.signal, &predicted),
        );

        FitResult {
            well,
            model: kind,
            status: FitStatus::Fitted,
            parameters,
            baseline_center: prepared.center,
            metrics,
        }
    }
}

/// Names of model parameters followed by `pre_i` and `post_i` baseline coefficients.
pub fn parameter_labels(names: &[&str], degree: usize) -> Vec<String> {
    names
        .iter()
        .map(|n| n.to_string())
        .chain((0..=degree).map(|i| format!("pre_{}", i)))
        .chain((0..=degree).map(|i| format!("post_{}", i)))
        .collect()
}

fn failed(
    well: WellId,
    kind: ModelKind,
    names: &[&str],
    degree: usize,
    failure: FitFailure,
) -> FitResult {
    let mut result = FitResult::empty(well, kind, FitStatus::Failed(failure));
    result.parameters = parameter_labels(names, degree)
        .into_iter()
        .map(|name| FittedParameter {
            name,
            value: f64::NAN,
            stderr: f64::NAN,
        })
        .collect();
    result
}

fn classify(
    converged: bool,
    nrmse: f64,
    threshold: f64,
    params: &[f64],
    bounds: &[(f64, f64)],
) -> Option<FitFailure> {
    if !converged || !(nrmse <= threshold) {
        return Some(FitFailure::NonConvergence);
    }
    let pinned = params.iter().zip(bounds).any(|(&p, &(lo, hi))| {
        let tolerance = 1e-6 * (hi - lo);
        p - lo <= tolerance || hi - p <= tolerance
    });
    pinned.then_some(FitFailure::OutOfBounds)
}

fn normalize(x: &[f64], signal: &[f64], pre: &[f64], post: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(signal)
        .map(|(&x, &s)| {
            let lo = polyval(pre, x);
            let hi = polyval(post, x);
            let span = hi - lo;
            if span.abs() > f64::EPSILON { (s - lo) / span } else { f64::NAN }
        })
        .collect()
}

fn moving_average(values: &[f64], points: usize) -> Vec<f64> {
    let half = points / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(values.len());
            let window: Vec<f64> = values[start..end]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            if window.is_empty() {
                f64::NAN
            } else {
                window.iter().sum::<f64>() / window.len() as f64
            }
        })
        .collect()
}

/// Locates the transition midpoint and its steepness on the baseline-normalized
/// curve: the derivative maximum picks the transition, the nearest 0.5 crossing
/// refines it.
fn estimate_shape(temperature: &[f64], unfolded: &[f64], domain: (f64, f64)) -> ShapeEstimate {
    let fallback_slope = 4.0 / (domain.1 - domain.0);
    let smooth = moving_average(unfolded, SMOOTHING_POINTS);
    let n = smooth.len();

    let steepest = (1..n.saturating_sub(1))
        .filter_map(|i| {
            let d = (smooth[i + 1] - smooth[i - 1]) / (temperature[i + 1] - temperature[i - 1]);
            d.is_finite().then_some((i, d))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));
    let Some((peak, peak_slope)) = steepest else {
        return ShapeEstimate {
            midpoint: 0.5 * (domain.0 + domain.1),
            slope: fallback_slope,
        };
    };

    let midpoint = (0..n - 1)
        .filter(|&i| {
            let (a, b) = (smooth[i] - 0.5, smooth[i + 1] - 0.5);
            a.is_finite() && b.is_finite() && a * b <= 0.0 && a != b
        })
        .min_by_key(|&i| i.abs_diff(peak))
        .map_or(temperature[peak], |i| {
            let (a, b) = (smooth[i] - 0.5, smooth[i + 1] - 0.5);
            temperature[i] + (temperature[i + 1] - temperature[i]) * a / (a - b)
        });

    let local: Vec<(f64, f64)> = temperature
        .iter()
        .zip(&smooth)
        .filter(|(t, f)| (**t - midpoint).abs() <= SLOPE_WINDOW && f.is_finite())
        .map(|(t, f)| (*t - midpoint, *f))
        .collect();
    let regression_slope = if local.len() >= 3 {
        let (x, y): (Vec<f64>, Vec<f64>) = local.into_iter().unzip();
        polyfit(&x, &y, 1).map_or(f64::NAN, |c| c[1])
    } else {
        peak_slope
    };
    let slope = if regression_slope.is_finite() && regression_slope > 0.0 {
        regression_slope
    } else {
        fallback_slope
    };

    ShapeEstimate { midpoint, slope }
}

fn dense_grid(domain: (f64, f64)) -> Vec<f64> {
    let steps = ((domain.1 - domain.0) / METRIC_GRID_STEP).ceil().max(1.0) as usize;
    (0..=steps)
        .map(|i| (domain.0 + METRIC_GRID_STEP * i as f64).min(domain.1))
        .collect()
}

fn first_crossing(grid: &[f64], values: &[f64], threshold: f64) -> f64 {
    grid.iter()
        .zip(values)
        .find(|(_, v)| **v >= threshold)
        .map_or(f64::NAN, |(t, _)| *t)
}

fn derive_metrics(
    model: &dyn UnfoldingModel,
    params: &[f64],
    context: &ModelContext,
    options: &FitOptions,
    score: f64,
) -> DerivedMetrics {
    let transitions = model.transitions(params);
    let grid = dense_grid(context.domain);
    let unfolded: Vec<f64> = model
        .native_fraction(params, &grid, context)
        .into_iter()
        .map(|f| 1.0 - f)
        .collect();

    let dg_std = match options.dcp {
        Some(_) => model
            .free_energy(params, options.reference_temperature, context)
            .unwrap_or(f64::NAN),
        None => f64::NAN,
    };

    let (t_agg, f_agg_end) = match model.aggregated_fraction(params, &grid, context) {
        Some(aggregated) => (
            first_crossing(&grid, &aggregated, options.aggregation_threshold),
            aggregated.last().copied().unwrap_or(f64::NAN),
        ),
        None => (f64::NAN, f64::NAN),
    };

    DerivedMetrics {
        tm: transitions.tm,
        tf: transitions.tf,
        t_onset: first_crossing(&grid, &unfolded, options.onset_threshold),
        dg_std,
        score,
        t_agg,
        f_agg_end,
    }
}

/// Fraction unfolded of `curve` obtained by removing the baselines of a fitted result.
pub fn baseline_corrected(curve: &Curve, result: &FitResult) -> Option<Curve> {
    if !result.status.is_fitted() {
        return None;
    }
    let pre = result.pre_baseline();
    let post = result.post_baseline();
    let x: Vec<f64> = curve
        .temperature
        .iter()
        .map(|t| t - result.baseline_center)
        .collect();
    Some(Curve::new(
        curve.temperature.clone(),
        normalize(&x, &curve.signal, &pre, &post),
    ))
}
