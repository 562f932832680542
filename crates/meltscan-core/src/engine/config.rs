use super::error::ValidationError;
use crate::core::fitting::fitter::FitOptions;
use crate::core::fitting::lm::LmConfig;
use crate::core::fitting::registry::{ModelKind, STANDARD_TEMPERATURE};
use crate::core::models::settings::{AnalysisSettings, BaselineBounds};
use crate::core::models::well::WellId;
use std::collections::BTreeSet;
use thiserror::Error;

pub const MAX_BASELINE_DEGREE: usize = 2;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Optimizer limits and reporting conventions shared by all fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    /// Temperature at which free energies are reported, in kelvin.
    pub reference_temperature: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        let lm = LmConfig::default();
        Self {
            max_iterations: lm.max_iterations,
            ftol: lm.ftol,
            xtol: lm.xtol,
            reference_temperature: STANDARD_TEMPERATURE,
        }
    }
}

impl FitConfig {
    pub fn lm(&self) -> LmConfig {
        LmConfig {
            max_iterations: self.max_iterations,
            ftol: self.ftol,
            xtol: self.xtol,
            ..LmConfig::default()
        }
    }

    /// Combines the optimizer limits with one dataset's settings.
    pub fn fit_options(&self, settings: &AnalysisSettings, scan_rate: f64) -> FitOptions {
        FitOptions {
            dcp: settings.dcp,
            baseline_degree: settings.baseline_degree,
            baseline_bounds: settings.baseline_bounds,
            scan_rate,
            onset_threshold: settings.onset_threshold,
            aggregation_threshold: settings.aggregation_threshold,
            reference_temperature: self.reference_temperature,
            lm: self.lm(),
        }
    }
}

#[derive(Default)]
pub struct FitConfigBuilder {
    max_iterations: Option<usize>,
    ftol: Option<f64>,
    xtol: Option<f64>,
    reference_temperature: Option<f64>,
}

impl FitConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn ftol(mut self, tolerance: f64) -> Self {
        self.ftol = Some(tolerance);
        self
    }
    pub fn xtol(mut self, tolerance: f64) -> Self {
        self.xtol = Some(tolerance);
        self
    }
    pub fn reference_temperature(mut self, kelvin: f64) -> Self {
        self.reference_temperature = Some(kelvin);
        self
    }

    pub fn build(self) -> Result<FitConfig, ConfigError> {
        let config = FitConfig {
            max_iterations: self
                .max_iterations
                .ok_or(ConfigError::MissingParameter("max_iterations"))?,
            ftol: self.ftol.ok_or(ConfigError::MissingParameter("ftol"))?,
            xtol: self.xtol.ok_or(ConfigError::MissingParameter("xtol"))?,
            reference_temperature: self
                .reference_temperature
                .ok_or(ConfigError::MissingParameter("reference_temperature"))?,
        };
        if config.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_iterations",
                reason: "must be at least 1".into(),
            });
        }
        for (name, value) in [("ftol", config.ftol), ("xtol", config.xtol)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("must be a positive number, got {}", value),
                });
            }
        }
        if !(config.reference_temperature.is_finite() && config.reference_temperature > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "reference_temperature",
                reason: "must be a positive temperature in kelvin".into(),
            });
        }
        Ok(config)
    }
}

/// A partial update of [`AnalysisSettings`].
///
/// Unset fields keep their current value. Fields whose setting is itself
/// optional (trim bounds, filter windows, dCp) take an `Option` so they can
/// also be cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisOptions {
    model: Option<ModelKind>,
    dcp: Option<Option<f64>>,
    baseline_degree: Option<usize>,
    baseline_bounds: Option<BaselineBounds>,
    onset_threshold: Option<f64>,
    aggregation_threshold: Option<f64>,
    exclude: Option<BTreeSet<WellId>>,
    blanks: Option<BTreeSet<WellId>>,
    invert: Option<bool>,
    trim_min: Option<Option<f64>>,
    trim_max: Option<Option<f64>>,
    median_filter: Option<Option<usize>>,
    shrink: Option<Option<f64>>,
    savgol: Option<Option<usize>>,
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: ModelKind) -> Self {
        self.model = Some(model);
        self
    }
    /// Selects the model by its registry name.
    pub fn model_name(self, name: &str) -> Result<Self, ValidationError> {
        Ok(self.model(name.parse()?))
    }
    pub fn dcp(mut self, dcp: Option<f64>) -> Self {
        self.dcp = Some(dcp);
        self
    }
    pub fn baseline_degree(mut self, degree: usize) -> Self {
        self.baseline_degree = Some(degree);
        self
    }
    pub fn baseline_bounds(mut self, bounds: BaselineBounds) -> Self {
        self.baseline_bounds = Some(bounds);
        self
    }
    pub fn onset_threshold(mut self, threshold: f64) -> Self {
        self.onset_threshold = Some(threshold);
        self
    }
    pub fn aggregation_threshold(mut self, threshold: f64) -> Self {
        self.aggregation_threshold = Some(threshold);
        self
    }
    pub fn exclude<I: IntoIterator<Item = WellId>>(mut self, wells: I) -> Self {
        self.exclude = Some(wells.into_iter().collect());
        self
    }
    pub fn blanks<I: IntoIterator<Item = WellId>>(mut self, wells: I) -> Self {
        self.blanks = Some(wells.into_iter().collect());
        self
    }
    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = Some(invert);
        self
    }
    pub fn trim_min(mut self, kelvin: Option<f64>) -> Self {
        self.trim_min = Some(kelvin);
        self
    }
    pub fn trim_max(mut self, kelvin: Option<f64>) -> Self {
        self.trim_max = Some(kelvin);
        self
    }
    pub fn median_filter(mut self, window: Option<usize>) -> Self {
        self.median_filter = Some(window);
        self
    }
    pub fn shrink(mut self, width: Option<f64>) -> Self {
        self.shrink = Some(width);
        self
    }
    pub fn savgol(mut self, window: Option<usize>) -> Self {
        self.savgol = Some(window);
        self
    }

    pub fn selected_model(&self) -> Option<ModelKind> {
        self.model
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns `current` with every set field replaced.
    pub fn apply_to(&self, current: &AnalysisSettings) -> AnalysisSettings {
        let mut next = current.clone();
        if let Some(model) = self.model {
            next.model = model;
        }
        if let Some(dcp) = self.dcp {
            next.dcp = dcp;
        }
        if let Some(degree) = self.baseline_degree {
            next.baseline_degree = degree;
        }
        if let Some(bounds) = self.baseline_bounds {
            next.baseline_bounds = bounds;
        }
        if let Some(threshold) = self.onset_threshold {
            next.onset_threshold = threshold;
        }
        if let Some(threshold) = self.aggregation_threshold {
            next.aggregation_threshold = threshold;
        }
        let prep = &mut next.preprocessing;
        if let Some(exclude) = &self.exclude {
            prep.exclude = exclude.clone();
        }
        if let Some(blanks) = &self.blanks {
            prep.blanks = blanks.clone();
        }
        if let Some(invert) = self.invert {
            prep.invert = invert;
        }
        if let Some(trim_min) = self.trim_min {
            prep.trim_min = trim_min;
        }
        if let Some(trim_max) = self.trim_max {
            prep.trim_max = trim_max;
        }
        if let Some(window) = self.median_filter {
            prep.median_filter = window;
        }
        if let Some(width) = self.shrink {
            prep.shrink = width;
        }
        if let Some(window) = self.savgol {
            prep.savgol = window;
        }
        next
    }
}

/// Checks the model-related part of `settings`; the preprocessing part is
/// validated by the pipeline against the concrete dataset.
pub fn validate_model_settings(settings: &AnalysisSettings) -> Result<(), ValidationError> {
    if settings.baseline_degree > MAX_BASELINE_DEGREE {
        return Err(ValidationError::InvalidSetting {
            name: "baseline_degree",
            reason: format!(
                "must be at most {}, got {}",
                MAX_BASELINE_DEGREE, settings.baseline_degree
            ),
        });
    }
    match settings.baseline_bounds {
        BaselineBounds::Fraction(f) if !(f > 0.0 && f <= 0.5) => {
            return Err(ValidationError::InvalidSetting {
                name: "baseline_bounds",
                reason: format!("fraction must lie in (0, 0.5], got {}", f),
            });
        }
        BaselineBounds::Points(n) if n < settings.baseline_degree + 2 => {
            return Err(ValidationError::InvalidSetting {
                name: "baseline_bounds",
                reason: format!(
                    "a degree-{} baseline needs at least {} points, got {}",
                    settings.baseline_degree,
                    settings.baseline_degree + 2,
                    n
                ),
            });
        }
        _ => {}
    }
    if let Some(dcp) = settings.dcp {
        if !dcp.is_finite() {
            return Err(ValidationError::InvalidSetting {
                name: "dcp",
                reason: "must be a finite number".into(),
            });
        }
    }
    for (name, value) in [
        ("onset_threshold", settings.onset_threshold),
        ("aggregation_threshold", settings.aggregation_threshold),
    ] {
        if !(value > 0.0 && value < 1.0) {
            return Err(ValidationError::InvalidSetting {
                name,
                reason: format!("must lie strictly between 0 and 1, got {}", value),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WellId {
        s.parse().unwrap()
    }

    fn complete_builder() -> FitConfigBuilder {
        FitConfigBuilder::new()
            .max_iterations(100)
            .ftol(1e-8)
            .xtol(1e-8)
            .reference_temperature(298.15)
    }

    #[test]
    fn fit_config_builder_succeeds_with_all_parameters() {
        let config = complete_builder().build().unwrap();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.lm().max_iterations, 100);
    }

    #[test]
    fn fit_config_builder_reports_missing_parameter() {
        let result = FitConfigBuilder::new().ftol(1e-8).build();
        assert_eq!(result, Err(ConfigError::MissingParameter("max_iterations")));
    }

    #[test]
    fn fit_config_builder_rejects_invalid_values() {
        assert!(matches!(
            complete_builder().max_iterations(0).build(),
            Err(ConfigError::InvalidParameter { name: "max_iterations", .. })
        ));
        assert!(matches!(
            complete_builder().ftol(-1.0).build(),
            Err(ConfigError::InvalidParameter { name: "ftol", .. })
        ));
    }

    #[test]
    fn apply_to_changes_only_set_fields() {
        let current = AnalysisSettings::default();
        let next = AnalysisOptions::new()
            .model(ModelKind::Irrev)
            .exclude([id("A1")])
            .trim_min(Some(300.0))
            .apply_to(&current);
        assert_eq!(next.model, ModelKind::Irrev);
        assert!(next.preprocessing.exclude.contains(&id("A1")));
        assert_eq!(next.preprocessing.trim_min, Some(300.0));
        assert_eq!(next.baseline_degree, current.baseline_degree);
        assert_eq!(next.preprocessing.trim_max, None);
    }

    #[test]
    fn optional_fields_can_be_cleared() {
        let mut current = AnalysisSettings::default();
        current.dcp = Some(2.0);
        current.preprocessing.savgol = Some(7);
        let next = AnalysisOptions::new().dcp(None).savgol(None).apply_to(&current);
        assert_eq!(next.dcp, None);
        assert_eq!(next.preprocessing.savgol, None);
    }

    #[test]
    fn model_name_rejects_unknown_models() {
        assert!(AnalysisOptions::new().model_name("lumry_eyring").is_ok());
        assert!(matches!(
            AnalysisOptions::new().model_name("three_state"),
            Err(ValidationError::UnknownModel(_))
        ));
    }

    #[test]
    fn model_settings_validation() {
        let mut settings = AnalysisSettings::default();
        assert!(validate_model_settings(&settings).is_ok());

        settings.baseline_degree = 3;
        assert!(validate_model_settings(&settings).is_err());

        settings.baseline_degree = 2;
        settings.baseline_bounds = BaselineBounds::Points(3);
        assert!(validate_model_settings(&settings).is_err());

        settings.baseline_bounds = BaselineBounds::Fraction(0.7);
        assert!(validate_model_settings(&settings).is_err());

        settings.baseline_bounds = BaselineBounds::Fraction(0.2);
        settings.onset_threshold = 1.0;
        assert!(validate_model_settings(&settings).is_err());
    }

    #[test]
    fn empty_options_are_detected() {
        assert!(AnalysisOptions::new().is_empty());
        assert!(!AnalysisOptions::new().invert(false).is_empty());
    }
}
