use crate::core::math::polynomial::polyfit;
use crate::core::math::stats::{mean, median};
use crate::core::models::curve::Curve;
use crate::core::models::well::WellId;
use std::collections::{BTreeMap, BTreeSet};

/// Polynomial order of the Savitzky-Golay derivative.
pub const SAVGOL_ORDER: usize = 2;

/// Subtracts the point-wise mean of the blank wells from every other well.
pub fn subtract_blanks(signals: &mut BTreeMap<WellId, Vec<f64>>, blanks: &BTreeSet<WellId>) {
    if blanks.is_empty() {
        return;
    }
    let blank_signals: Vec<&Vec<f64>> = blanks.iter().filter_map(|b| signals.get(b)).collect();
    let Some(len) = blank_signals.first().map(|s| s.len()) else {
        return;
    };
    let reference: Vec<f64> = (0..len)
        .map(|i| mean(&blank_signals.iter().map(|s| s[i]).collect::<Vec<_>>()))
        .collect();

    for (well, signal) in signals.iter_mut() {
        if blanks.contains(well) {
            continue;
        }
        for (value, blank) in signal.iter_mut().zip(&reference) {
            *value -= blank;
        }
    }
}

/// Running median; the window is truncated at both ends of the series.
pub fn median_filter(signal: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..signal.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(signal.len());
            median(&signal[start..end])
        })
        .collect()
}

/// Averages points into consecutive temperature bins of `width` kelvin,
/// starting at the first temperature.
pub fn shrink(curve: &Curve, width: f64) -> Curve {
    let Some(&origin) = curve.temperature.first() else {
        return Curve::default();
    };
    let mut temperature = Vec::new();
    let mut signal = Vec::new();
    let mut current_bin = None;
    let mut bin_t = Vec::new();
    let mut bin_s = Vec::new();

    for (t, s) in curve.iter() {
        let bin = ((t - origin) / width).floor() as i64;
        if current_bin.is_some_and(|b| b != bin) {
            temperature.push(mean(&bin_t));
            signal.push(mean(&bin_s));
            bin_t.clear();
            bin_s.clear();
        }
        current_bin = Some(bin);
        bin_t.push(t);
        bin_s.push(s);
    }
    if !bin_t.is_empty() {
        temperature.push(mean(&bin_t));
        signal.push(mean(&bin_s));
    }
    Curve::new(temperature, signal)
}

/// First derivative of the signal with respect to temperature.
///
/// Without a window, central differences are used (one-sided at the ends).
/// With a window, each point gets the slope of a local quadratic least squares
/// fit, which handles non-uniform temperature spacing.
pub fn derivative(curve: &Curve, savgol_window: Option<usize>) -> Curve {
    let n = curve.len();
    let t = &curve.temperature;
    let s = &curve.signal;
    let values = match savgol_window {
        Some(window) if window <= n => (0..n)
            .map(|i| {
                let start = i.saturating_sub(window / 2).min(n - window);
                let x: Vec<f64> = t[start..start + window].iter().map(|v| v - t[i]).collect();
                polyfit(&x, &s[start..start + window], SAVGOL_ORDER)
                    .map_or_else(|| central_difference(t, s, i), |c| c[1])
            })
            .collect(),
        _ => (0..n).map(|i| central_difference(t, s, i)).collect(),
    };
    Curve::new(t.clone(), values)
}

fn central_difference(t: &[f64], s: &[f64], i: usize) -> f64 {
    let n = t.len();
    if n < 2 {
        return f64::NAN;
    }
    let (lo, hi) = match i {
        0 => (0, 1),
        _ if i == n - 1 => (n - 2, n - 1),
        _ => (i - 1, i + 1),
    };
    (s[hi] - s[lo]) / (t[hi] - t[lo])
}
