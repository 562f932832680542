use super::config::FitConfig;
use super::error::EngineError;
use super::parallel::WorkerPool;
use super::progress::{Progress, ProgressReporter};
use crate::core::fitting::fitter::{WellFitter, baseline_corrected};
use crate::core::fitting::score::ScoringStrategy;
use crate::core::models::dataset::{Dataset, DerivedCurves};
use crate::core::models::results::{FitFailure, FitResult, FitStatus, ResultTable};
use crate::core::preprocessing::PreprocessingPipeline;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, instrument, warn};

/// Derived curves and results of one analysis run, not yet stored in a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub derived: DerivedCurves,
    pub results: ResultTable,
}

/// Runs the preprocessing pipeline and the per-well fits of one dataset.
#[derive(Clone, Copy)]
pub struct DatasetAnalyzer<'a> {
    pub pipeline: &'a PreprocessingPipeline,
    pub fit_config: &'a FitConfig,
    pub scoring: &'a dyn ScoringStrategy,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> DatasetAnalyzer<'a> {
    pub fn new(
        pipeline: &'a PreprocessingPipeline,
        fit_config: &'a FitConfig,
        scoring: &'a dyn ScoringStrategy,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            pipeline,
            fit_config,
            scoring,
            reporter,
        }
    }

    /// Computes the analysis of `dataset` without modifying it.
    ///
    /// Preprocessing errors abort the run. Fit failures of individual wells
    /// become failure rows.
    pub fn analyse(
        &self,
        dataset: &Dataset,
        pool: &WorkerPool,
    ) -> Result<AnalysisOutcome, EngineError> {
        let settings = dataset.settings();
        let model = settings.model;
        let prep = &settings.preprocessing;

        let data = self.pipeline.apply(
            dataset.temperature(),
            dataset.raw_signals(),
            prep,
            dataset.active_domain(),
        )?;

        let jobs: Vec<_> = data
            .processed
            .iter()
            .filter(|(well, _)| !prep.exclude.contains(well))
            .collect();
        let options = self.fit_config.fit_options(settings, dataset.scan_rate());
        let fitter = WellFitter::new(self.scoring);

        self.reporter.report(Progress::TaskStart {
            total_steps: jobs.len() as u64,
        });
        let fitted: Vec<FitResult> = pool.map(&jobs, |(well, curve)| {
            let attempt =
                panic::catch_unwind(AssertUnwindSafe(|| fitter.fit(**well, curve, model, &options)));
            let result = attempt.unwrap_or_else(|payload| {
                warn!("Fit of well {} panicked: {}", well, panic_message(&*payload));
                FitResult::empty(**well, model, FitStatus::Failed(FitFailure::NonConvergence))
            });
            self.reporter.report(Progress::TaskIncrement);
            result
        });
        self.reporter.report(Progress::TaskFinish);

        let mut fitted: BTreeMap<_, _> = fitted.into_iter().map(|r| (r.well, r)).collect();
        let rows: Vec<FitResult> = dataset
            .wells()
            .map(|well| {
                if prep.blanks.contains(&well) {
                    FitResult::empty(well, model, FitStatus::Blank)
                } else if prep.exclude.contains(&well) {
                    FitResult::empty(well, model, FitStatus::Excluded)
                } else if let Some(result) = fitted.remove(&well) {
                    result
                } else {
                    FitResult::empty(well, model, FitStatus::Excluded)
                }
            })
            .collect();
        let results = ResultTable::from_rows(rows);

        let corrected = results
            .rows()
            .iter()
            .filter_map(|row| {
                let curve = data.processed.get(&row.well)?;
                baseline_corrected(curve, row).map(|c| (row.well, c))
            })
            .collect();

        Ok(AnalysisOutcome {
            derived: DerivedCurves {
                processed: data.processed,
                derivative: data.derivative,
                baseline_corrected: corrected,
            },
            results,
        })
    }

    /// Analyses `dataset` and stores the outcome in it. On error the dataset
    /// is left untouched.
    #[instrument(skip_all, name = "dataset_analysis", fields(dataset = dataset.name()))]
    pub fn prepare_and_analyse(
        &self,
        dataset: &mut Dataset,
        pool: &WorkerPool,
    ) -> Result<(), EngineError> {
        self.reporter.report(Progress::DatasetStart {
            name: dataset.name().to_string(),
            wells: dataset.well_count() as u64,
        });
        let model = dataset.settings().model;
        info!(
            "Analysing {} wells with model '{}' ({} jobs).",
            dataset.well_count(),
            model,
            pool.n_jobs()
        );

        let outcome = self.analyse(dataset, pool)?;
        let summary = summarize(&outcome.results);
        if !model.is_skip() && summary.fitted == 0 {
            warn!("No well of dataset '{}' could be fitted.", dataset.name());
        }
        for row in outcome.results.rows() {
            if let FitStatus::Failed(reason) = &row.status {
                debug!("Well {} failed: {}", row.well, reason);
            }
        }
        info!(
            "Dataset '{}' done: {} fitted, {} failed, {} excluded, {} blank.",
            dataset.name(),
            summary.fitted,
            summary.failed,
            summary.excluded,
            summary.blank
        );

        dataset.store_analysis(outcome.derived, outcome.results);
        dataset.log(format!(
            "analysed: model={} fitted={} failed={} excluded={} blank={}",
            model, summary.fitted, summary.failed, summary.excluded, summary.blank
        ));
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StatusSummary {
    fitted: usize,
    failed: usize,
    excluded: usize,
    blank: usize,
}

fn summarize(results: &ResultTable) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for row in results.rows() {
        match row.status {
            FitStatus::Fitted => summary.fitted += 1,
            FitStatus::Failed(_) => summary.failed += 1,
            FitStatus::Excluded => summary.excluded += 1,
            FitStatus::Blank => summary.blank += 1,
            FitStatus::Skipped => {}
        }
    }
    summary
}
