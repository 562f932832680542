use super::layout::Layout;
use super::well::WellId;
use crate::core::fitting::registry::ModelKind;
use crate::core::utils::serde_nan;
use phf::{Map, phf_map};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why a single-well fit did not produce a usable result.
///
/// Failures are recorded in the result table and never abort a batch.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitFailure {
    #[error("optimizer did not converge to an acceptable solution")]
    NonConvergence,
    #[error("solution lies on a parameter bound")]
    OutOfBounds,
    #[error("too few data points left after preprocessing")]
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "kebab-case")]
pub enum FitStatus {
    Fitted,
    Failed(FitFailure),
    Excluded,
    Blank,
    Skipped,
}

impl FitStatus {
    pub fn is_fitted(&self) -> bool {
        matches!(self, FitStatus::Fitted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FitStatus::Fitted => "fitted",
            FitStatus::Failed(FitFailure::NonConvergence) => "failed: non-convergence",
            FitStatus::Failed(FitFailure::OutOfBounds) => "failed: out-of-bounds",
            FitStatus::Failed(FitFailure::InsufficientData) => "failed: insufficient data",
            FitStatus::Excluded => "excluded",
            FitStatus::Blank => "blank",
            FitStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParameter {
    pub name: String,
    #[serde(with = "serde_nan")]
    pub value: f64,
    #[serde(with = "serde_nan")]
    pub stderr: f64,
}

/// Quantities derived from a fitted curve. Every field is NaN when not applicable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    #[serde(with = "serde_nan")]
    pub tm: f64,
    #[serde(with = "serde_nan")]
    pub tf: f64,
    #[serde(with = "serde_nan")]
    pub t_onset: f64,
    #[serde(with = "serde_nan")]
    pub dg_std: f64,
    #[serde(with = "serde_nan")]
    pub score: f64,
    #[serde(with = "serde_nan")]
    pub t_agg: f64,
    #[serde(with = "serde_nan")]
    pub f_agg_end: f64,
}

impl Default for DerivedMetrics {
    fn default() -> Self {
        Self {
            tm: f64::NAN,
            tf: f64::NAN,
            t_onset: f64::NAN,
            dg_std: f64::NAN,
            score: f64::NAN,
            t_agg: f64::NAN,
            f_agg_end: f64::NAN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub well: WellId,
    pub model: ModelKind,
    pub status: FitStatus,
    /// Model parameters followed by the pre- and post-transition baseline coefficients.
    pub parameters: Vec<FittedParameter>,
    /// Temperature around which baseline polynomials are expanded.
    #[serde(with = "serde_nan")]
    pub baseline_center: f64,
    pub metrics: DerivedMetrics,
}

impl FitResult {
    /// A row without fitted values, used for wells that were not fitted.
    pub fn empty(well: WellId, model: ModelKind, status: FitStatus) -> Self {
        Self {
            well,
            model,
            status,
            parameters: Vec::new(),
            baseline_center: f64::NAN,
            metrics: DerivedMetrics::default(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&FittedParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn parameter_value(&self, name: &str) -> f64 {
        self.parameter(name).map_or(f64::NAN, |p| p.value)
    }

    fn baseline(&self, prefix: &str) -> Vec<f64> {
        self.parameters
            .iter()
            .filter(|p| p.name.starts_with(prefix))
            .map(|p| p.value)
            .collect()
    }

    pub fn pre_baseline(&self) -> Vec<f64> {
        self.baseline("pre_")
    }

    pub fn post_baseline(&self) -> Vec<f64> {
        self.baseline("post_")
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        if !self.status.is_fitted() {
            return f64::NAN;
        }
        match metric {
            Metric::TmFit => self.metrics.tm,
            Metric::DhmFit => self.parameter_value("dHm"),
            Metric::TfFit => self.metrics.tf,
            Metric::EaFit => self.parameter_value("Ea"),
            Metric::TOnset => self.metrics.t_onset,
            Metric::DgStd => self.metrics.dg_std,
            Metric::Score => self.metrics.score,
            Metric::TAgg => self.metrics.t_agg,
            Metric::FAggEnd => self.metrics.f_agg_end,
        }
    }
}

/// A reportable per-well quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Metric {
    TmFit,
    DhmFit,
    TfFit,
    EaFit,
    TOnset,
    DgStd,
    Score,
    TAgg,
    FAggEnd,
}

static METRIC_NAMES: Map<&'static str, Metric> = phf_map! {
    "Tm_fit" => Metric::TmFit,
    "dHm_fit" => Metric::DhmFit,
    "Tf_fit" => Metric::TfFit,
    "Ea_fit" => Metric::EaFit,
    "T_onset" => Metric::TOnset,
    "dG_std" => Metric::DgStd,
    "S" => Metric::Score,
    "T_agg" => Metric::TAgg,
    "f_agg_end" => Metric::FAggEnd,
};

impl Metric {
    /// Columns reported for every dataset.
    pub const BASE: [Metric; 7] = [
        Metric::TmFit,
        Metric::DhmFit,
        Metric::TfFit,
        Metric::EaFit,
        Metric::TOnset,
        Metric::DgStd,
        Metric::Score,
    ];

    /// Columns added once any dataset uses a three-state model.
    pub const THREE_STATE: [Metric; 2] = [Metric::TAgg, Metric::FAggEnd];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::TmFit => "Tm_fit",
            Metric::DhmFit => "dHm_fit",
            Metric::TfFit => "Tf_fit",
            Metric::EaFit => "Ea_fit",
            Metric::TOnset => "T_onset",
            Metric::DgStd => "dG_std",
            Metric::Score => "S",
            Metric::TAgg => "T_agg",
            Metric::FAggEnd => "f_agg_end",
        }
    }

    pub fn schema(three_state: bool) -> Vec<Metric> {
        let mut columns = Metric::BASE.to_vec();
        if three_state {
            columns.extend_from_slice(&Metric::THREE_STATE);
        }
        columns
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown metric '{0}'")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        METRIC_NAMES
            .get(s.trim())
            .copied()
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

impl TryFrom<String> for Metric {
    type Error = UnknownMetric;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        metric.name().to_string()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which result columns a collection of datasets reports.
///
/// The schema only ever widens: once a three-state model has been selected
/// anywhere, the extra columns stay for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultSchema {
    #[default]
    TwoState,
    ThreeStateAware,
}

impl ResultSchema {
    pub fn is_three_state(&self) -> bool {
        matches!(self, ResultSchema::ThreeStateAware)
    }

    pub fn metrics(&self) -> Vec<Metric> {
        Metric::schema(self.is_three_state())
    }

    /// The schema after adopting `model`.
    pub fn widen(self, model: ModelKind) -> Self {
        if model.is_three_state() {
            ResultSchema::ThreeStateAware
        } else {
            self
        }
    }
}

/// Per-well fit results of one dataset, always sorted by well id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    rows: Vec<FitResult>,
}

impl ResultTable {
    pub fn from_rows(mut rows: Vec<FitResult>) -> Self {
        rows.sort_by_key(|row| row.well);
        Self { rows }
    }

    pub fn rows(&self) -> &[FitResult] {
        &self.rows
    }

    pub fn get(&self, well: WellId) -> Option<&FitResult> {
        self.rows
            .binary_search_by_key(&well, |row| row.well)
            .ok()
            .map(|idx| &self.rows[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.rows.windows(2).all(|w| w[0].well < w[1].well)
    }

    pub fn fitted_count(&self) -> usize {
        self.rows.iter().filter(|r| r.status.is_fitted()).count()
    }

    /// Flattens the rows into a table with one column per metric and one value
    /// and standard-error column per fitted parameter.
    pub fn to_table(&self, layout: &Layout, schema: ResultSchema) -> Table {
        let metrics = schema.metrics();
        let parameter_names: Vec<String> = self
            .rows
            .iter()
            .find(|r| !r.parameters.is_empty())
            .map(|r| r.parameters.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default();

        let mut value_columns: Vec<String> = metrics.iter().map(|m| m.name().to_string()).collect();
        for name in &parameter_names {
            value_columns.push(name.clone());
            value_columns.push(format!("{}_err", name));
        }

        let mut table = Table::new(
            vec![
                "ID".to_string(),
                "Condition".to_string(),
                "Model".to_string(),
                "Status".to_string(),
            ],
            value_columns,
        );
        for row in &self.rows {
            let mut values: Vec<f64> = metrics.iter().map(|m| row.metric(*m)).collect();
            for name in &parameter_names {
                match row.parameter(name) {
                    Some(p) => values.extend([p.value, p.stderr]),
                    None => values.extend([f64::NAN, f64::NAN]),
                }
            }
            table.push(
                vec![
                    row.well.to_string(),
                    layout.condition(row.well).unwrap_or_default().to_string(),
                    row.model.to_string(),
                    row.status.label().to_string(),
                ],
                values,
            );
        }
        table
    }
}

/// A rectangular table with textual key columns and numeric value columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub key_columns: Vec<String>,
    pub value_columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub keys: Vec<String>,
    #[serde(with = "serde_nan::vec")]
    pub values: Vec<f64>,
}

impl Table {
    pub fn new(key_columns: Vec<String>, value_columns: Vec<String>) -> Self {
        Self {
            key_columns,
            value_columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, keys: Vec<String>, values: Vec<f64>) {
        debug_assert_eq!(keys.len(), self.key_columns.len());
        debug_assert_eq!(values.len(), self.value_columns.len());
        self.rows.push(TableRow { keys, values });
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.value_columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WellId {
        s.parse().unwrap()
    }

    #[test]
    fn result_table_sorts_rows_by_well() {
        let rows = vec![
            FitResult::empty(id("B1"), ModelKind::Santoro1988, FitStatus::Excluded),
            FitResult::empty(id("A10"), ModelKind::Santoro1988, FitStatus::Excluded),
            FitResult::empty(id("A2"), ModelKind::Santoro1988, FitStatus::Excluded),
        ];
        let table = ResultTable::from_rows(rows);
        let order: Vec<String> = table.rows().iter().map(|r| r.well.to_string()).collect();
        assert_eq!(order, vec!["A2", "A10", "B1"]);
        assert!(table.is_sorted());
        assert!(table.get(id("A10")).is_some());
        assert!(table.get(id("C1")).is_none());
    }

    #[test]
    fn metrics_of_unfitted_rows_are_nan() {
        let mut row = FitResult::empty(id("A1"), ModelKind::Santoro1988, FitStatus::Excluded);
        row.metrics.tm = 330.0;
        assert!(row.metric(Metric::TmFit).is_nan());
        row.status = FitStatus::Fitted;
        assert_eq!(row.metric(Metric::TmFit), 330.0);
    }

    #[test]
    fn metric_names_parse_back() {
        for metric in Metric::schema(true) {
            assert_eq!(metric.name().parse::<Metric>().unwrap(), metric);
        }
        assert!("Tm".parse::<Metric>().is_err());
    }

    #[test]
    fn schema_widens_with_three_state_columns() {
        assert_eq!(Metric::schema(false).len(), 7);
        let wide = Metric::schema(true);
        assert_eq!(wide.len(), 9);
        assert_eq!(wide.last(), Some(&Metric::FAggEnd));
    }

    #[test]
    fn baseline_coefficients_are_split_by_prefix() {
        let mut row = FitResult::empty(id("A1"), ModelKind::Santoro1988, FitStatus::Fitted);
        for (name, value) in [("Tm", 320.0), ("pre_0", 1.0), ("pre_1", 0.1), ("post_0", 2.0), ("post_1", 0.2)] {
            row.parameters.push(FittedParameter {
                name: name.into(),
                value,
                stderr: f64::NAN,
            });
        }
        assert_eq!(row.pre_baseline(), vec![1.0, 0.1]);
        assert_eq!(row.post_baseline(), vec![2.0, 0.2]);
    }

    #[test]
    fn failure_status_survives_json() {
        let row = FitResult::empty(
            id("A1"),
            ModelKind::Irrev,
            FitStatus::Failed(FitFailure::OutOfBounds),
        );
        let json = serde_json::to_string(&row).unwrap();
        let back: FitResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, row.status);
        assert!(back.metrics.tm.is_nan());
    }

    #[test]
    fn schema_only_widens() {
        let schema = ResultSchema::TwoState.widen(ModelKind::LumryEyring);
        assert_eq!(schema, ResultSchema::ThreeStateAware);
        assert_eq!(schema.widen(ModelKind::Santoro1988), ResultSchema::ThreeStateAware);
        assert_eq!(ResultSchema::TwoState.widen(ModelKind::Irrev), ResultSchema::TwoState);
    }

    #[test]
    fn to_table_fills_nan_for_unfitted_rows() {
        let mut fitted = FitResult::empty(id("A1"), ModelKind::Santoro1988, FitStatus::Fitted);
        fitted.metrics.tm = 321.0;
        fitted.parameters.push(FittedParameter {
            name: "Tm".into(),
            value: 321.0,
            stderr: 0.1,
        });
        let excluded = FitResult::empty(id("A2"), ModelKind::Santoro1988, FitStatus::Excluded);
        let table = ResultTable::from_rows(vec![excluded, fitted]);
        let layout = Layout::from_labels([(id("A2"), "buffer")]);

        let out = table.to_table(&layout, ResultSchema::ThreeStateAware);
        assert_eq!(out.key_columns, vec!["ID", "Condition", "Model", "Status"]);
        assert_eq!(out.value_columns.len(), 9 + 2);
        assert_eq!(out.rows[0].keys[0], "A1");
        assert_eq!(out.rows[0].values[out.column_index("Tm_fit").unwrap()], 321.0);
        assert_eq!(out.rows[1].keys[1], "buffer");
        assert_eq!(out.rows[1].keys[3], "excluded");
        assert!(out.rows[1].values.iter().all(|v| v.is_nan()));
    }
}
