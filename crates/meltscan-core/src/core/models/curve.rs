use crate::core::utils::serde_nan;
use serde::{Deserialize, Serialize};

/// An ordered series of (temperature, signal) observations for one well.
///
/// Temperatures are in kelvin and strictly ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub temperature: Vec<f64>,
    #[serde(with = "serde_nan::vec")]
    pub signal: Vec<f64>,
}

impl Curve {
    pub fn new(temperature: Vec<f64>, signal: Vec<f64>) -> Self {
        debug_assert_eq!(temperature.len(), signal.len());
        Self {
            temperature,
            signal,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.temperature.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty()
    }

    pub fn domain(&self) -> Option<(f64, f64)> {
        Some((*self.temperature.first()?, *self.temperature.last()?))
    }

    /// Returns the sub-curve restricted to `[min, max]` (inclusive).
    pub fn restrict(&self, min: f64, max: f64) -> Curve {
        let (temperature, signal) = self
            .temperature
            .iter()
            .zip(&self.signal)
            .filter(|(t, _)| **t >= min && **t <= max)
            .map(|(t, s)| (*t, *s))
            .unzip();
        Curve {
            temperature,
            signal,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.temperature
            .iter()
            .copied()
            .zip(self.signal.iter().copied())
    }

    pub fn signal_range(&self) -> f64 {
        let (min, max) = self
            .signal
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });
        if min.is_finite() && max.is_finite() {
            max - min
        } else {
            0.0
        }
    }
}
