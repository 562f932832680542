use super::models::{IrreversibleModel, LumryEyringModel, Santoro1988Model};
use phf::{Map, phf_map};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Gas constant in kJ/(mol K).
pub const GAS_CONSTANT: f64 = 8.314462618e-3;

/// Reference temperature for reporting free energies (25 °C).
pub const STANDARD_TEMPERATURE: f64 = 298.15;

/// Bounds for enthalpies and activation energies, in kJ/mol.
pub const ENERGY_BOUNDS: (f64, f64) = (10.0, 3000.0);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown model '{0}' (expected one of: skip, santoro1988, irrev, lumry_eyring)")]
pub struct UnknownModelError(pub String);

/// The closed set of analysis models.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Skip,
    #[default]
    Santoro1988,
    Irrev,
    LumryEyring,
}

static MODEL_NAMES: Map<&'static str, ModelKind> = phf_map! {
    "skip" => ModelKind::Skip,
    "santoro1988" => ModelKind::Santoro1988,
    "irrev" => ModelKind::Irrev,
    "lumry_eyring" => ModelKind::LumryEyring,
};

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Skip => "skip",
            ModelKind::Santoro1988 => "santoro1988",
            ModelKind::Irrev => "irrev",
            ModelKind::LumryEyring => "lumry_eyring",
        }
    }

    #[inline]
    pub fn is_skip(&self) -> bool {
        matches!(self, ModelKind::Skip)
    }

    /// Whether the model tracks a third (aggregated) state.
    #[inline]
    pub fn is_three_state(&self) -> bool {
        matches!(self, ModelKind::LumryEyring)
    }

    /// Resolves the model implementation; `None` for [`ModelKind::Skip`].
    pub fn model(&self) -> Option<&'static dyn UnfoldingModel> {
        match self {
            ModelKind::Skip => None,
            ModelKind::Santoro1988 => Some(&Santoro1988Model),
            ModelKind::Irrev => Some(&IrreversibleModel),
            ModelKind::LumryEyring => Some(&LumryEyringModel),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = UnknownModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MODEL_NAMES
            .get(s.trim().to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| UnknownModelError(s.to_string()))
    }
}

/// Experiment-level quantities a model needs besides its own parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelContext {
    /// Heat capacity change in kJ/(mol K); zero when not supplied.
    pub dcp: f64,
    /// Heating rate in K/min.
    pub scan_rate: f64,
    /// Temperature domain of the fitted curve.
    pub domain: (f64, f64),
}

/// Shape information extracted from a baseline-normalized curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeEstimate {
    /// Temperature at which half of the signal change has occurred.
    pub midpoint: f64,
    /// Slope of the unfolded fraction at the midpoint, in 1/K.
    pub slope: f64,
}

/// Transition temperatures reported by a model. NaN where not applicable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transitions {
    pub tm: f64,
    pub tf: f64,
}

/// A biophysical model of the native-state population as a function of temperature.
///
/// The observed signal of every model is
/// `f_N(T) * pre(T) + (1 - f_N(T)) * post(T)` with polynomial baselines.
pub trait UnfoldingModel: Sync {
    fn kind(&self) -> ModelKind;

    fn parameter_names(&self) -> &'static [&'static str];

    fn initial_guess(&self, shape: &ShapeEstimate, context: &ModelContext) -> Vec<f64>;

    fn bounds(&self, context: &ModelContext) -> Vec<(f64, f64)>;

    /// Fraction of molecules in the native state at each temperature.
    fn native_fraction(&self, params: &[f64], temperature: &[f64], context: &ModelContext)
    -> Vec<f64>;

    /// Fraction of irreversibly aggregated molecules, for three-state models.
    fn aggregated_fraction(
        &self,
        _params: &[f64],
        _temperature: &[f64],
        _context: &ModelContext,
    ) -> Option<Vec<f64>> {
        None
    }

    fn transitions(&self, params: &[f64]) -> Transitions;

    /// Unfolding free energy at `temperature`, when the model defines one.
    fn free_energy(&self, _params: &[f64], _temperature: f64, _context: &ModelContext) -> Option<f64> {
        None
    }

    /// Largest acceptable RMSE relative to the signal range.
    fn residual_threshold(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_registry() {
        for kind in [
            ModelKind::Skip,
            ModelKind::Santoro1988,
            ModelKind::Irrev,
            ModelKind::LumryEyring,
        ] {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = "santoro".parse::<ModelKind>().unwrap_err();
        assert_eq!(err, UnknownModelError("santoro".into()));
    }

    #[test]
    fn skip_has_no_implementation() {
        assert!(ModelKind::Skip.model().is_none());
        let model = ModelKind::LumryEyring.model().unwrap();
        assert_eq!(model.kind(), ModelKind::LumryEyring);
        assert_eq!(model.parameter_names(), &["Tm", "dHm", "Tf", "Ea"]);
    }

    #[test]
    fn serde_uses_registry_names() {
        let json = serde_json::to_string(&ModelKind::LumryEyring).unwrap();
        assert_eq!(json, "\"lumry_eyring\"");
        let kind: ModelKind = serde_json::from_str("\"santoro1988\"").unwrap();
        assert_eq!(kind, ModelKind::Santoro1988);
    }
}
