use crate::core::math::stats::mean;
use crate::core::models::dataset::Dataset;
use crate::core::models::layout::Layout;
use crate::core::models::results::{Metric, ResultSchema, Table};
use crate::core::models::well::WellId;
use crate::engine::error::ValidationError;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombineMode {
    /// One row per well with the selected metrics of every analysed dataset.
    #[default]
    Filtered,
    /// Every dataset's raw table verbatim, plus its results when present.
    Unfiltered,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombineOptions {
    /// Metrics to report. Empty selects every column of the current schema.
    pub metrics: Vec<Metric>,
    pub mode: CombineMode,
    /// Wells scoring below this value report NaN for that dataset.
    pub min_score: Option<f64>,
    /// Average rows that share a condition label.
    pub merge_duplicates: bool,
    /// Restricts the output to the named datasets.
    pub datasets: Option<Vec<String>>,
}

impl CombineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metric_names<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self, ValidationError> {
        self.metrics = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn unfiltered(mut self) -> Self {
        self.mode = CombineMode::Unfiltered;
        self
    }

    pub fn min_score(mut self, score: f64) -> Self {
        self.min_score = Some(score);
        self
    }

    pub fn merge_duplicates(mut self, merge: bool) -> Self {
        self.merge_duplicates = merge;
        self
    }

    pub fn datasets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.datasets = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetTables {
    pub name: String,
    pub raw: Table,
    pub results: Option<Table>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CombinedResults {
    Summary(Table),
    Unfiltered(Vec<DatasetTables>),
}

impl CombinedResults {
    pub fn summary(&self) -> Option<&Table> {
        match self {
            CombinedResults::Summary(table) => Some(table),
            CombinedResults::Unfiltered(_) => None,
        }
    }
}

pub(crate) fn combine(
    datasets: &[&Dataset],
    layout: &Layout,
    schema: ResultSchema,
    options: &CombineOptions,
) -> Result<CombinedResults, ValidationError> {
    let selected = select(datasets, options.datasets.as_deref())?;
    match options.mode {
        CombineMode::Unfiltered => Ok(CombinedResults::Unfiltered(
            selected
                .iter()
                .map(|ds| DatasetTables {
                    name: ds.name().to_string(),
                    raw: ds.raw_table(),
                    results: ds.results().map(|r| r.to_table(layout, schema)),
                })
                .collect(),
        )),
        CombineMode::Filtered => {
            let metrics = resolve_metrics(&options.metrics, schema)?;
            if let Some(score) = options.min_score {
                if !(0.0..=1.0).contains(&score) {
                    return Err(ValidationError::InvalidSetting {
                        name: "min_score",
                        reason: format!("must lie in [0, 1], got {}", score),
                    });
                }
            }
            let table = summary_table(&selected, layout, &metrics, options.min_score);
            Ok(CombinedResults::Summary(if options.merge_duplicates {
                merge_by_condition(table)
            } else {
                table
            }))
        }
    }
}

fn select<'d>(
    datasets: &[&'d Dataset],
    names: Option<&[String]>,
) -> Result<Vec<&'d Dataset>, ValidationError> {
    let Some(names) = names else {
        return Ok(datasets.to_vec());
    };
    if names.is_empty() {
        return Err(ValidationError::NoDatasetsSelected);
    }
    names
        .iter()
        .map(|name| {
            datasets
                .iter()
                .find(|ds| ds.name() == name)
                .copied()
                .ok_or_else(|| ValidationError::UnknownDataset(name.clone()))
        })
        .collect()
}

fn resolve_metrics(requested: &[Metric], schema: ResultSchema) -> Result<Vec<Metric>, ValidationError> {
    let available = schema.metrics();
    if requested.is_empty() {
        return Ok(available);
    }
    for metric in requested {
        if !available.contains(metric) {
            return Err(ValidationError::InvalidSetting {
                name: "metrics",
                reason: format!("'{}' is only reported for three-state models", metric),
            });
        }
    }
    Ok(requested.to_vec())
}

fn summary_table(
    datasets: &[&Dataset],
    layout: &Layout,
    metrics: &[Metric],
    min_score: Option<f64>,
) -> Table {
    let analysed: Vec<&Dataset> = datasets
        .iter()
        .copied()
        .filter(|ds| !ds.is_skipped() && ds.results().is_some())
        .collect();

    let mut columns = Vec::new();
    for ds in &analysed {
        for metric in metrics {
            columns.push(format!("{}:{}", ds.name(), metric));
        }
    }
    let mut table = Table::new(vec!["ID".to_string(), "Condition".to_string()], columns);

    let wells: BTreeSet<WellId> = analysed.iter().flat_map(|ds| ds.wells()).collect();
    for well in wells {
        let mut values = Vec::with_capacity(table.value_columns.len());
        for ds in &analysed {
            let row = ds.results().and_then(|r| r.get(well));
            let passes = match (row, min_score) {
                (Some(row), Some(min)) => row.metric(Metric::Score) >= min,
                _ => true,
            };
            for metric in metrics {
                values.push(match row {
                    Some(row) if passes => row.metric(*metric),
                    _ => f64::NAN,
                });
            }
        }
        table.push(
            vec![
                well.to_string(),
                layout.condition(well).unwrap_or_default().to_string(),
            ],
            values,
        );
    }
    table
}

/// Collapses rows with the same non-empty condition into one row holding the
/// mean of the finite values of each column.
fn merge_by_condition(table: Table) -> Table {
    let mut groups: Vec<(String, Vec<String>, Vec<Vec<f64>>)> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();

    for row in table.rows {
        let well = row.keys[0].clone();
        let condition = row.keys[1].clone();
        let slot = if condition.is_empty() {
            None
        } else {
            index.get(&condition).copied()
        };
        match slot {
            Some(i) => {
                groups[i].1.push(well);
                groups[i].2.push(row.values);
            }
            None => {
                if !condition.is_empty() {
                    index.insert(condition.clone(), groups.len());
                }
                groups.push((condition, vec![well], vec![row.values]));
            }
        }
    }

    let mut merged = Table::new(table.key_columns, table.value_columns);
    for (condition, wells, rows) in groups {
        let values = (0..merged.value_columns.len())
            .map(|col| {
                let finite: Vec<f64> = rows
                    .iter()
                    .map(|r| r[col])
                    .filter(|v| v.is_finite())
                    .collect();
                if finite.is_empty() {
                    f64::NAN
                } else {
                    mean(&finite)
                }
            })
            .collect();
        merged.push(vec![wells.join(","), condition], values);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &str, f64)]) -> Table {
        let mut table = Table::new(
            vec!["ID".into(), "Condition".into()],
            vec!["Signal:Tm_fit".into()],
        );
        for (well, condition, value) in rows {
            table.push(vec![well.to_string(), condition.to_string()], vec![*value]);
        }
        table
    }

    #[test]
    fn merge_averages_finite_values_per_condition() {
        let merged = merge_by_condition(table(&[
            ("A1", "buffer", 320.0),
            ("A2", "salt", 330.0),
            ("A3", "buffer", 322.0),
            ("A4", "buffer", f64::NAN),
        ]));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows[0].keys, vec!["A1,A3,A4", "buffer"]);
        assert_eq!(merged.rows[0].values, vec![321.0]);
        assert_eq!(merged.rows[1].keys, vec!["A2", "salt"]);
    }

    #[test]
    fn merge_keeps_unlabeled_wells_separate() {
        let merged = merge_by_condition(table(&[("A1", "", 320.0), ("A2", "", 330.0)]));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_of_all_nan_group_is_nan() {
        let merged = merge_by_condition(table(&[("A1", "x", f64::NAN), ("A2", "x", f64::NAN)]));
        assert!(merged.rows[0].values[0].is_nan());
    }

    #[test]
    fn three_state_metrics_require_wide_schema() {
        assert!(resolve_metrics(&[Metric::TAgg], ResultSchema::TwoState).is_err());
        assert_eq!(
            resolve_metrics(&[Metric::TAgg], ResultSchema::ThreeStateAware).unwrap(),
            vec![Metric::TAgg]
        );
        assert_eq!(resolve_metrics(&[], ResultSchema::TwoState).unwrap().len(), 7);
    }

    #[test]
    fn metric_names_are_parsed() {
        let options = CombineOptions::new().metric_names(&["Tm_fit", "S"]).unwrap();
        assert_eq!(options.metrics, vec![Metric::TmFit, Metric::Score]);
        assert!(matches!(
            CombineOptions::new().metric_names(&["Tm"]),
            Err(ValidationError::UnknownMetric(_))
        ));
    }
}
