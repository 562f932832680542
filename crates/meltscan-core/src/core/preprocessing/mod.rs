//! Signal conditioning applied to raw curves before fitting.
//!
//! The pipeline runs a fixed sequence of optional stages. It never touches the
//! raw data and returns freshly computed curves, so a failure leaves whatever
//! the caller stored previously intact.

pub mod filters;

use crate::core::models::curve::Curve;
use crate::core::models::settings::PreprocessingSettings;
use crate::core::models::well::WellId;
use filters::SAVGOL_ORDER;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DOMAIN_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreprocessingError {
    #[error("{stage} window must be odd, got {window}")]
    EvenWindow { stage: &'static str, window: usize },

    #[error("{stage} window must be at least {minimum}, got {window}")]
    WindowTooSmall {
        stage: &'static str,
        window: usize,
        minimum: usize,
    },

    #[error("{stage} window of {window} points exceeds the {points} available points")]
    WindowTooLarge {
        stage: &'static str,
        window: usize,
        points: usize,
    },

    #[error("Shrink bin width must be a positive number of kelvin, got {0}")]
    InvalidShrink(f64),

    #[error("trim_min ({min}) must be lower than trim_max ({max})")]
    TrimInverted { min: f64, max: f64 },

    #[error("Trim bound {value} lies outside the active domain [{domain_min}, {domain_max}]")]
    TrimOutOfDomain {
        value: f64,
        domain_min: f64,
        domain_max: f64,
    },

    #[error("Trim window keeps only {points} point(s)")]
    TrimTooNarrow { points: usize },

    #[error("{role} well {well} is not part of the dataset")]
    UnknownWell { role: &'static str, well: WellId },

    #[error("All wells are excluded or marked as blanks")]
    AllWellsExcluded,

    #[error("Invalid stage ordering: {0}")]
    StageOrder(String),
}

/// One step of the pipeline, listed in the only order in which stages may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Blank,
    Exclude,
    Invert,
    Trim,
    MedianFilter,
    Shrink,
    Derivative,
}

impl Stage {
    pub const CANONICAL: [Stage; 7] = [
        Stage::Blank,
        Stage::Exclude,
        Stage::Invert,
        Stage::Trim,
        Stage::MedianFilter,
        Stage::Shrink,
        Stage::Derivative,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Blank => "blank",
            Stage::Exclude => "exclude",
            Stage::Invert => "invert",
            Stage::Trim => "trim",
            Stage::MedianFilter => "median-filter",
            Stage::Shrink => "shrink",
            Stage::Derivative => "derivative",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = PreprocessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::CANONICAL
            .into_iter()
            .find(|stage| stage.name() == s.trim())
            .ok_or_else(|| PreprocessingError::StageOrder(format!("unknown stage '{}'", s)))
    }
}

/// Curves produced by one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessedData {
    /// Analysis-ready curves of every well that is neither excluded nor blank.
    pub processed: BTreeMap<WellId, Curve>,
    pub derivative: BTreeMap<WellId, Curve>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessingPipeline {
    stages: Vec<Stage>,
}

impl Default for PreprocessingPipeline {
    fn default() -> Self {
        Self {
            stages: Stage::CANONICAL.to_vec(),
        }
    }
}

impl PreprocessingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pipeline from a subset of stages, which must appear in
    /// canonical order without repetition. Exclusion is always part of the
    /// result: excluded wells are never handed to the fitter.
    pub fn with_stages(stages: &[Stage]) -> Result<Self, PreprocessingError> {
        if let Some(pair) = stages.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PreprocessingError::StageOrder(format!(
                "'{}' cannot run after '{}'",
                pair[1], pair[0]
            )));
        }
        let mut stages = stages.to_vec();
        if let Err(position) = stages.binary_search(&Stage::Exclude) {
            stages.insert(position, Stage::Exclude);
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    fn has(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Checks `settings` against a dataset and returns the active domain the
    /// settings imply. Trimming can only narrow the current domain.
    pub fn validate(
        &self,
        settings: &PreprocessingSettings,
        wells: &BTreeSet<WellId>,
        temperature: &[f64],
        active_domain: (f64, f64),
    ) -> Result<(f64, f64), PreprocessingError> {
        for well in &settings.exclude {
            if !wells.contains(well) {
                return Err(PreprocessingError::UnknownWell {
                    role: "Excluded",
                    well: *well,
                });
            }
        }
        for well in &settings.blanks {
            if !wells.contains(well) {
                return Err(PreprocessingError::UnknownWell {
                    role: "Blank",
                    well: *well,
                });
            }
        }
        if wells
            .iter()
            .all(|w| settings.exclude.contains(w) || settings.blanks.contains(w))
        {
            return Err(PreprocessingError::AllWellsExcluded);
        }

        if let Some(window) = settings.median_filter {
            check_odd_window("Median filter", window, 3)?;
        }
        if let Some(window) = settings.savgol {
            check_odd_window("Savitzky-Golay", window, SAVGOL_ORDER + 1)?;
        }
        if let Some(width) = settings.shrink {
            if !(width.is_finite() && width > 0.0) {
                return Err(PreprocessingError::InvalidShrink(width));
            }
        }

        let domain = resolve_trim(settings, active_domain)?;
        let points = temperature
            .iter()
            .filter(|t| **t >= domain.0 && **t <= domain.1)
            .count();
        if points < 2 {
            return Err(PreprocessingError::TrimTooNarrow { points });
        }
        Ok(domain)
    }

    /// Runs the enabled stages over the raw signals.
    pub fn apply(
        &self,
        temperature: &[f64],
        raw: &BTreeMap<WellId, Vec<f64>>,
        settings: &PreprocessingSettings,
        active_domain: (f64, f64),
    ) -> Result<PreprocessedData, PreprocessingError> {
        let mut signals = raw.clone();

        if self.has(Stage::Blank) {
            filters::subtract_blanks(&mut signals, &settings.blanks);
        }
        signals.retain(|well, _| {
            !settings.blanks.contains(well) && !settings.exclude.contains(well)
        });
        if signals.is_empty() {
            return Err(PreprocessingError::AllWellsExcluded);
        }

        let mut curves: BTreeMap<WellId, Curve> = signals
            .into_iter()
            .map(|(well, signal)| {
                let signal = if self.has(Stage::Invert) && settings.invert {
                    signal.into_iter().map(|v| -v).collect()
                } else {
                    signal
                };
                (well, Curve::new(temperature.to_vec(), signal))
            })
            .collect();

        if self.has(Stage::Trim) {
            let (lo, hi) = active_domain;
            for curve in curves.values_mut() {
                *curve = curve.restrict(lo - DOMAIN_TOLERANCE, hi + DOMAIN_TOLERANCE);
            }
        }

        if self.has(Stage::MedianFilter) {
            if let Some(window) = settings.median_filter {
                for curve in curves.values_mut() {
                    curve.signal = filters::median_filter(&curve.signal, window);
                }
            }
        }

        if self.has(Stage::Shrink) {
            if let Some(width) = settings.shrink {
                for curve in curves.values_mut() {
                    *curve = filters::shrink(curve, width);
                }
            }
        }

        let mut derivative = BTreeMap::new();
        if self.has(Stage::Derivative) {
            if let Some(window) = settings.savgol {
                let points = curves.values().next().map_or(0, Curve::len);
                if window > points {
                    return Err(PreprocessingError::WindowTooLarge {
                        stage: "Savitzky-Golay",
                        window,
                        points,
                    });
                }
            }
            derivative = curves
                .iter()
                .map(|(well, curve)| (*well, filters::derivative(curve, settings.savgol)))
                .collect();
        }

        Ok(PreprocessedData {
            processed: curves,
            derivative,
        })
    }
}

fn check_odd_window(
    stage: &'static str,
    window: usize,
    minimum: usize,
) -> Result<(), PreprocessingError> {
    if window % 2 == 0 {
        return Err(PreprocessingError::EvenWindow { stage, window });
    }
    if window < minimum {
        return Err(PreprocessingError::WindowTooSmall {
            stage,
            window,
            minimum,
        });
    }
    Ok(())
}

fn resolve_trim(
    settings: &PreprocessingSettings,
    (domain_min, domain_max): (f64, f64),
) -> Result<(f64, f64), PreprocessingError> {
    let lo = settings.trim_min.unwrap_or(domain_min);
    let hi = settings.trim_max.unwrap_or(domain_max);
    for value in [lo, hi] {
        if !value.is_finite()
            || value < domain_min - DOMAIN_TOLERANCE
            || value > domain_max + DOMAIN_TOLERANCE
        {
            return Err(PreprocessingError::TrimOutOfDomain {
                value,
                domain_min,
                domain_max,
            });
        }
    }
    if lo >= hi {
        return Err(PreprocessingError::TrimInverted { min: lo, max: hi });
    }
    Ok((lo.max(domain_min), hi.min(domain_max)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WellId {
        s.parse().unwrap()
    }

    fn axis() -> Vec<f64> {
        (0..21).map(|i| 300.0 + i as f64).collect()
    }

    fn raw() -> BTreeMap<WellId, Vec<f64>> {
        let mut raw = BTreeMap::new();
        raw.insert(id("A1"), (0..21).map(|i| i as f64).collect());
        raw.insert(id("A2"), vec![1.0; 21]);
        raw.insert(id("A3"), vec![2.0; 21]);
        raw
    }

    fn wells() -> BTreeSet<WellId> {
        raw().keys().copied().collect()
    }

    #[test]
    fn with_stages_rejects_out_of_order_and_duplicates() {
        assert!(PreprocessingPipeline::with_stages(&[Stage::Blank, Stage::Trim]).is_ok());
        assert!(matches!(
            PreprocessingPipeline::with_stages(&[Stage::Shrink, Stage::Trim]),
            Err(PreprocessingError::StageOrder(_))
        ));
        assert!(matches!(
            PreprocessingPipeline::with_stages(&[Stage::Trim, Stage::Trim]),
            Err(PreprocessingError::StageOrder(_))
        ));
    }

    #[test]
    fn with_stages_always_keeps_exclusion() {
        let pipeline =
            PreprocessingPipeline::with_stages(&[Stage::Blank, Stage::Trim, Stage::Derivative])
                .unwrap();
        assert_eq!(
            pipeline.stages(),
            &[Stage::Blank, Stage::Exclude, Stage::Trim, Stage::Derivative]
        );
        assert_eq!(
            PreprocessingPipeline::with_stages(&[]).unwrap().stages(),
            &[Stage::Exclude]
        );
    }

    #[test]
    fn excluded_wells_are_dropped_by_custom_stage_lists() {
        let mut settings = PreprocessingSettings::default();
        settings.exclude.insert(id("A1"));
        for stages in [
            vec![Stage::Blank, Stage::Trim, Stage::Derivative],
            vec![Stage::Invert],
            vec![],
        ] {
            let data = PreprocessingPipeline::with_stages(&stages)
                .unwrap()
                .apply(&axis(), &raw(), &settings, (300.0, 320.0))
                .unwrap();
            assert!(!data.processed.contains_key(&id("A1")), "{:?}", stages);
            assert!(!data.derivative.contains_key(&id("A1")));
            assert_eq!(data.processed.len(), 2);
        }
    }

    #[test]
    fn stage_names_parse() {
        assert_eq!("median-filter".parse::<Stage>().unwrap(), Stage::MedianFilter);
        assert!("smooth".parse::<Stage>().is_err());
    }

    #[test]
    fn validate_rejects_bad_windows() {
        let pipeline = PreprocessingPipeline::new();
        let mut settings = PreprocessingSettings::default();
        settings.median_filter = Some(4);
        assert!(matches!(
            pipeline.validate(&settings, &wells(), &axis(), (300.0, 320.0)),
            Err(PreprocessingError::EvenWindow { .. })
        ));

        settings.median_filter = None;
        settings.savgol = Some(1);
        assert!(matches!(
            pipeline.validate(&settings, &wells(), &axis(), (300.0, 320.0)),
            Err(PreprocessingError::WindowTooSmall { .. })
        ));
    }

    #[test]
    fn validate_rejects_inverted_and_out_of_domain_trim() {
        let pipeline = PreprocessingPipeline::new();
        let mut settings = PreprocessingSettings::default();
        settings.trim_min = Some(310.0);
        settings.trim_max = Some(305.0);
        assert!(matches!(
            pipeline.validate(&settings, &wells(), &axis(), (300.0, 320.0)),
            Err(PreprocessingError::TrimInverted { .. })
        ));

        settings.trim_min = Some(295.0);
        settings.trim_max = None;
        assert!(matches!(
            pipeline.validate(&settings, &wells(), &axis(), (300.0, 320.0)),
            Err(PreprocessingError::TrimOutOfDomain { .. })
        ));
    }

    #[test]
    fn trim_narrows_and_is_idempotent() {
        let pipeline = PreprocessingPipeline::new();
        let mut settings = PreprocessingSettings::default();
        settings.trim_min = Some(305.0);
        settings.trim_max = Some(315.0);

        let first = pipeline
            .validate(&settings, &wells(), &axis(), (300.0, 320.0))
            .unwrap();
        assert_eq!(first, (305.0, 315.0));
        let second = pipeline.validate(&settings, &wells(), &axis(), first).unwrap();
        assert_eq!(second, first);

        settings.trim_min = None;
        settings.trim_max = None;
        let unset = pipeline.validate(&settings, &wells(), &axis(), first).unwrap();
        assert_eq!(unset, first);
    }

    #[test]
    fn validate_rejects_unknown_and_fully_excluded_wells() {
        let pipeline = PreprocessingPipeline::new();
        let mut settings = PreprocessingSettings::default();
        settings.exclude.insert(id("H12"));
        assert!(matches!(
            pipeline.validate(&settings, &wells(), &axis(), (300.0, 320.0)),
            Err(PreprocessingError::UnknownWell { .. })
        ));

        settings.exclude = wells();
        assert!(matches!(
            pipeline.validate(&settings, &wells(), &axis(), (300.0, 320.0)),
            Err(PreprocessingError::AllWellsExcluded)
        ));
    }

    #[test]
    fn apply_runs_stages_in_order() {
        let pipeline = PreprocessingPipeline::new();
        let mut settings = PreprocessingSettings::default();
        settings.blanks.insert(id("A2"));
        settings.exclude.insert(id("A3"));
        settings.invert = true;

        let data = pipeline
            .apply(&axis(), &raw(), &settings, (305.0, 310.0))
            .unwrap();

        assert_eq!(data.processed.len(), 1);
        let curve = &data.processed[&id("A1")];
        assert_eq!(curve.temperature, vec![305.0, 306.0, 307.0, 308.0, 309.0, 310.0]);
        // blank subtraction happens before inversion: -(i - 1)
        assert_eq!(curve.signal[0], -4.0);
        let slope = &data.derivative[&id("A1")];
        assert!(slope.signal.iter().all(|v| (v + 1.0).abs() < 1e-9));
    }

    #[test]
    fn apply_without_derivative_stage_leaves_derivative_empty() {
        let pipeline =
            PreprocessingPipeline::with_stages(&[Stage::Blank, Stage::Exclude, Stage::Trim])
                .unwrap();
        let data = pipeline
            .apply(&axis(), &raw(), &PreprocessingSettings::default(), (300.0, 320.0))
            .unwrap();
        assert_eq!(data.processed.len(), 3);
        assert!(data.derivative.is_empty());
    }

    #[test]
    fn apply_rejects_savgol_window_longer_than_processed_curve() {
        let pipeline = PreprocessingPipeline::new();
        let mut settings = PreprocessingSettings::default();
        settings.savgol = Some(9);
        settings.shrink = Some(5.0);
        assert!(matches!(
            pipeline.apply(&axis(), &raw(), &settings, (300.0, 320.0)),
            Err(PreprocessingError::WindowTooLarge { .. })
        ));
    }

    #[test]
    fn raw_signals_are_not_modified() {
        let raw = raw();
        let before = raw.clone();
        let mut settings = PreprocessingSettings::default();
        settings.invert = true;
        settings.median_filter = Some(3);
        PreprocessingPipeline::new()
            .apply(&axis(), &raw, &settings, (300.0, 320.0))
            .unwrap();
        assert_eq!(raw, before);
    }
}
