use super::curve::Curve;
use super::layout::Layout;
use super::results::{ResultTable, Table};
use super::settings::AnalysisSettings;
use super::well::{Well, WellId};
use crate::core::io::error::LoadError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_SCAN_RATE: f64 = 1.0;

/// Curves computed from the raw data by the most recent successful analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedCurves {
    pub processed: BTreeMap<WellId, Curve>,
    pub derivative: BTreeMap<WellId, Curve>,
    /// Fraction unfolded, obtained by removing the fitted baselines.
    pub baseline_corrected: BTreeMap<WellId, Curve>,
}

/// One optical readout of a plate.
///
/// Raw signals are immutable after construction and share a single temperature
/// axis. Settings, derived curves and results only change through the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
    temperature: Vec<f64>,
    raw: BTreeMap<WellId, Vec<f64>>,
    scan_rate: f64,
    settings: AnalysisSettings,
    active_domain: (f64, f64),
    derived: Option<DerivedCurves>,
    results: Option<ResultTable>,
    protocol: Vec<String>,
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        temperature: Vec<f64>,
        raw: BTreeMap<WellId, Vec<f64>>,
        scan_rate: f64,
    ) -> Result<Self, LoadError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LoadError::Metadata("readout name must not be empty".into()));
        }
        if !(scan_rate.is_finite() && scan_rate > 0.0) {
            return Err(LoadError::Metadata(format!(
                "scan rate must be positive, got {}",
                scan_rate
            )));
        }
        validate_axis(&temperature)?;
        if raw.is_empty() {
            return Err(LoadError::Empty("wells"));
        }
        for (well, signal) in &raw {
            if signal.len() != temperature.len() {
                return Err(LoadError::LengthMismatch {
                    well: well.to_string(),
                    expected: temperature.len(),
                    found: signal.len(),
                });
            }
            if signal.iter().any(|v| !v.is_finite()) {
                return Err(LoadError::NonFinite {
                    context: format!("signal of well {} in readout '{}'", well, name),
                });
            }
        }

        let active_domain = (temperature[0], temperature[temperature.len() - 1]);
        Ok(Self {
            name,
            temperature,
            raw,
            scan_rate,
            settings: AnalysisSettings::default(),
            active_domain,
            derived: None,
            results: None,
            protocol: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temperature(&self) -> &[f64] {
        &self.temperature
    }

    pub fn scan_rate(&self) -> f64 {
        self.scan_rate
    }

    pub fn wells(&self) -> impl Iterator<Item = WellId> + '_ {
        self.raw.keys().copied()
    }

    pub fn contains_well(&self, well: WellId) -> bool {
        self.raw.contains_key(&well)
    }

    pub fn well_count(&self) -> usize {
        self.raw.len()
    }

    pub fn raw_signals(&self) -> &BTreeMap<WellId, Vec<f64>> {
        &self.raw
    }

    pub fn raw_curve(&self, well: WellId) -> Option<Curve> {
        self.raw
            .get(&well)
            .map(|signal| Curve::new(self.temperature.clone(), signal.clone()))
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// The temperature window currently eligible for analysis. Trimming only
    /// ever narrows it.
    pub fn active_domain(&self) -> (f64, f64) {
        self.active_domain
    }

    pub fn full_domain(&self) -> (f64, f64) {
        (self.temperature[0], self.temperature[self.temperature.len() - 1])
    }

    pub fn derived(&self) -> Option<&DerivedCurves> {
        self.derived.as_ref()
    }

    pub fn results(&self) -> Option<&ResultTable> {
        self.results.as_ref()
    }

    pub fn protocol(&self) -> &[String] {
        &self.protocol
    }

    pub fn is_skipped(&self) -> bool {
        self.settings.model.is_skip()
    }

    pub fn well(&self, id: WellId, layout: &Layout) -> Option<Well> {
        if !self.contains_well(id) {
            return None;
        }
        Some(Well {
            id,
            condition: layout.condition(id).map(str::to_string),
            exclude: self.settings.preprocessing.exclude.contains(&id),
            blank: self.settings.preprocessing.blanks.contains(&id),
        })
    }

    /// Replaces the settings. Derived curves and results computed under other
    /// settings are discarded; returns whether anything was discarded.
    pub(crate) fn apply_settings(
        &mut self,
        settings: AnalysisSettings,
        active_domain: (f64, f64),
    ) -> bool {
        if settings == self.settings && active_domain == self.active_domain {
            return false;
        }
        self.settings = settings;
        self.active_domain = active_domain;
        let stale = self.derived.is_some() || self.results.is_some();
        self.derived = None;
        self.results = None;
        stale
    }

    pub(crate) fn store_analysis(&mut self, derived: DerivedCurves, results: ResultTable) {
        self.derived = Some(derived);
        self.results = Some(results);
    }

    pub(crate) fn log(&mut self, entry: impl Into<String>) {
        self.protocol.push(entry.into());
    }

    /// The raw signals as a temperature-by-well table.
    pub fn raw_table(&self) -> Table {
        let columns: Vec<WellId> = self.raw.keys().copied().collect();
        let mut table = Table::new(
            vec!["Temperature".to_string()],
            columns.iter().map(WellId::to_string).collect(),
        );
        for (i, t) in self.temperature.iter().enumerate() {
            let values = columns.iter().map(|w| self.raw[w][i]).collect();
            table.push(vec![t.to_string()], values);
        }
        table
    }

    /// Checks the invariants that deserialization alone cannot enforce.
    pub fn validate(&self) -> Result<(), String> {
        validate_axis(&self.temperature).map_err(|e| e.to_string())?;
        if self.raw.is_empty() {
            return Err(format!("dataset '{}' has no wells", self.name));
        }
        for (well, signal) in &self.raw {
            if signal.len() != self.temperature.len() {
                return Err(format!(
                    "well {} of dataset '{}' does not match the temperature axis",
                    well, self.name
                ));
            }
        }
        let (lo, hi) = self.active_domain;
        let (full_lo, full_hi) = self.full_domain();
        if !(lo < hi && lo >= full_lo && hi <= full_hi) {
            return Err(format!(
                "active domain of dataset '{}' lies outside its data",
                self.name
            ));
        }
        if let Some(results) = &self.results {
            if !results.is_sorted() {
                return Err(format!("results of dataset '{}' are not sorted", self.name));
            }
            if let Some(row) = results.rows().iter().find(|r| !self.contains_well(r.well)) {
                return Err(format!(
                    "results of dataset '{}' reference unknown well {}",
                    self.name, row.well
                ));
            }
        }
        Ok(())
    }
}

/// Builds a table of derived curves; all wells share the processed grid.
pub fn curves_table(curves: &BTreeMap<WellId, Curve>) -> Table {
    let mut table = Table::new(
        vec!["Temperature".to_string()],
        curves.keys().map(WellId::to_string).collect(),
    );
    let Some(first) = curves.values().next() else {
        return table;
    };
    for (i, t) in first.temperature.iter().enumerate() {
        let values = curves
            .values()
            .map(|c| c.signal.get(i).copied().unwrap_or(f64::NAN))
            .collect();
        table.push(vec![t.to_string()], values);
    }
    table
}

fn validate_axis(temperature: &[f64]) -> Result<(), LoadError> {
    if temperature.len() < 2 {
        return Err(LoadError::Empty("temperature axis"));
    }
    if temperature.iter().any(|t| !t.is_finite()) {
        return Err(LoadError::NonFinite {
            context: "temperature axis".into(),
        });
    }
    if let Some(index) = temperature.windows(2).position(|w| w[1] <= w[0]) {
        return Err(LoadError::UnsortedTemperature { index: index + 1 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WellId {
        s.parse().unwrap()
    }

    fn small_dataset() -> Dataset {
        let mut raw = BTreeMap::new();
        raw.insert(id("A2"), vec![1.0, 2.0, 3.0]);
        raw.insert(id("A1"), vec![4.0, 5.0, 6.0]);
        Dataset::new("Ratio", vec![300.0, 301.0, 302.0], raw, DEFAULT_SCAN_RATE).unwrap()
    }

    #[test]
    fn new_sets_active_domain_to_full_axis() {
        let dataset = small_dataset();
        assert_eq!(dataset.active_domain(), (300.0, 302.0));
        assert_eq!(dataset.well_count(), 2);
        assert!(dataset.results().is_none());
        assert!(dataset.validate().is_ok());
    }

    #[test]
    fn new_rejects_descending_axis() {
        let mut raw = BTreeMap::new();
        raw.insert(id("A1"), vec![1.0, 2.0, 3.0]);
        let err = Dataset::new("x", vec![300.0, 302.0, 301.0], raw, 1.0).unwrap_err();
        assert!(matches!(err, LoadError::UnsortedTemperature { index: 2 }));
    }

    #[test]
    fn new_rejects_length_mismatch_and_nan() {
        let mut raw = BTreeMap::new();
        raw.insert(id("A1"), vec![1.0, 2.0]);
        assert!(matches!(
            Dataset::new("x", vec![300.0, 301.0, 302.0], raw, 1.0),
            Err(LoadError::LengthMismatch { .. })
        ));

        let mut raw = BTreeMap::new();
        raw.insert(id("A1"), vec![1.0, f64::NAN, 3.0]);
        assert!(matches!(
            Dataset::new("x", vec![300.0, 301.0, 302.0], raw, 1.0),
            Err(LoadError::NonFinite { .. })
        ));
    }

    #[test]
    fn new_rejects_non_positive_scan_rate() {
        let mut raw = BTreeMap::new();
        raw.insert(id("A1"), vec![1.0, 2.0]);
        assert!(matches!(
            Dataset::new("x", vec![300.0, 301.0], raw, 0.0),
            Err(LoadError::Metadata(_))
        ));
    }

    #[test]
    fn raw_table_has_wells_in_canonical_order() {
        let table = small_dataset().raw_table();
        assert_eq!(table.value_columns, vec!["A1", "A2"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].keys, vec!["300"]);
        assert_eq!(table.rows[0].values, vec![4.0, 1.0]);
    }

    #[test]
    fn well_view_combines_layout_and_flags() {
        let mut dataset = small_dataset();
        let mut settings = dataset.settings().clone();
        settings.preprocessing.exclude.insert(id("A1"));
        dataset.apply_settings(settings, dataset.active_domain());
        let layout = Layout::from_labels([(id("A1"), "buffer")]);

        let well = dataset.well(id("A1"), &layout).unwrap();
        assert_eq!(well.condition.as_deref(), Some("buffer"));
        assert!(well.exclude);
        assert!(!well.blank);
        assert!(dataset.well(id("H12"), &layout).is_none());
    }

    #[test]
    fn changed_settings_discard_stale_results() {
        let mut dataset = small_dataset();
        dataset.store_analysis(DerivedCurves::default(), ResultTable::default());
        let settings = dataset.settings().clone();

        assert!(!dataset.apply_settings(settings.clone(), dataset.active_domain()));
        assert!(dataset.results().is_some());

        let mut changed = settings;
        changed.preprocessing.exclude.insert(id("A1"));
        assert!(dataset.apply_settings(changed, dataset.active_domain()));
        assert!(dataset.results().is_none());
        assert!(dataset.derived().is_none());
    }
}
