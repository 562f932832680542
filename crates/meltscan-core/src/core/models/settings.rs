use super::well::WellId;
use crate::core::fitting::registry::ModelKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Signal-conditioning parameters of one dataset. Every stage is skipped when
/// its parameter is unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingSettings {
    pub exclude: BTreeSet<WellId>,
    pub blanks: BTreeSet<WellId>,
    pub invert: bool,
    pub trim_min: Option<f64>,
    pub trim_max: Option<f64>,
    /// Median filter window, in points.
    pub median_filter: Option<usize>,
    /// Bin width, in kelvin.
    pub shrink: Option<f64>,
    /// Savitzky-Golay window for the derivative, in points.
    pub savgol: Option<usize>,
}

/// How the pre- and post-transition tails used for baseline estimation are sized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaselineBounds {
    /// Share of the points at each end of the curve.
    Fraction(f64),
    /// Number of points at each end of the curve.
    Points(usize),
}

impl BaselineBounds {
    pub fn window_len(&self, n_points: usize) -> usize {
        match *self {
            BaselineBounds::Fraction(f) => ((n_points as f64) * f).round() as usize,
            BaselineBounds::Points(n) => n,
        }
    }
}

impl Default for BaselineBounds {
    fn default() -> Self {
        BaselineBounds::Fraction(0.15)
    }
}

pub const DEFAULT_ONSET_THRESHOLD: f64 = 0.01;
pub const DEFAULT_AGGREGATION_THRESHOLD: f64 = 0.5;
pub const DEFAULT_BASELINE_DEGREE: usize = 1;

/// The complete analysis configuration of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub preprocessing: PreprocessingSettings,
    pub model: ModelKind,
    /// Heat capacity change of unfolding in kJ/(mol K). `None` disables the
    /// free-energy extrapolation.
    pub dcp: Option<f64>,
    pub baseline_degree: usize,
    pub baseline_bounds: BaselineBounds,
    pub onset_threshold: f64,
    pub aggregation_threshold: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            preprocessing: PreprocessingSettings::default(),
            model: ModelKind::Santoro1988,
            dcp: None,
            baseline_degree: DEFAULT_BASELINE_DEGREE,
            baseline_bounds: BaselineBounds::default(),
            onset_threshold: DEFAULT_ONSET_THRESHOLD,
            aggregation_threshold: DEFAULT_AGGREGATION_THRESHOLD,
        }
    }
}
