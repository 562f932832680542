use crate::core::math::stats::{sum_squared_error, total_sum_of_squares};
use serde::{Deserialize, Serialize};

/// Maps a fitted curve to a quality score in `[0, 1]`; higher is better.
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, observed: &[f64], predicted: &[f64]) -> f64;

    /// Serializable description, for strategies that can be restored from a session.
    fn config(&self) -> Option<ScoringConfig> {
        None
    }
}

/// The built-in scoring strategies in a form that can be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScoringConfig {
    RSquared,
    NormalizedRmse { scale: f64 },
}

impl ScoringConfig {
    pub fn strategy(self) -> Box<dyn ScoringStrategy> {
        match self {
            ScoringConfig::RSquared => Box::new(RSquaredScore),
            ScoringConfig::NormalizedRmse { scale } => Box::new(NormalizedRmseScore { scale }),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ScoringConfig::RSquared => true,
            ScoringConfig::NormalizedRmse { scale } => scale.is_finite() && *scale > 0.0,
        }
    }
}

/// Coefficient of determination, floored at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct RSquaredScore;

impl ScoringStrategy for RSquaredScore {
    fn name(&self) -> &'static str {
        "r-squared"
    }

    fn config(&self) -> Option<ScoringConfig> {
        Some(ScoringConfig::RSquared)
    }

    fn score(&self, observed: &[f64], predicted: &[f64]) -> f64 {
        let sst = total_sum_of_squares(observed);
        if !(sst > 0.0) {
            return 0.0;
        }
        (1.0 - sum_squared_error(observed, predicted) / sst).clamp(0.0, 1.0)
    }
}

/// `exp(-nrmse / scale)` where the RMSE is normalized by the signal range.
#[derive(Debug, Clone, Copy)]
pub struct NormalizedRmseScore {
    pub scale: f64,
}

impl Default for NormalizedRmseScore {
    fn default() -> Self {
        Self { scale: 0.05 }
    }
}

impl ScoringStrategy for NormalizedRmseScore {
    fn name(&self) -> &'static str {
        "normalized-rmse"
    }

    fn config(&self) -> Option<ScoringConfig> {
        Some(ScoringConfig::NormalizedRmse { scale: self.scale })
    }

    fn score(&self, observed: &[f64], predicted: &[f64]) -> f64 {
        let nrmse = normalized_rmse(observed, predicted);
        if nrmse.is_finite() {
            (-nrmse / self.scale).exp().clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Root mean squared error divided by the range of the observed values.
pub fn normalized_rmse(observed: &[f64], predicted: &[f64]) -> f64 {
    if observed.is_empty() {
        return f64::NAN;
    }
    let rmse = (sum_squared_error(observed, predicted) / observed.len() as f64).sqrt();
    let (lo, hi) = observed
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    if range > 0.0 { rmse / range } else { f64::INFINITY }
}
