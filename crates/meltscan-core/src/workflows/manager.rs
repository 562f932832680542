use super::combine::{CombineOptions, CombinedResults, combine};
use super::export::{ExportOptions, ExportSnapshot, ReportRenderer};
use crate::core::fitting::score::{RSquaredScore, ScoringStrategy};
use crate::core::io::error::{LoadError, SchemaError};
use crate::core::io::import::PlateImport;
use crate::core::io::layout_csv::read_layout_from_path;
use crate::core::io::session::{AnalysisSetup, SessionBody, SessionCodec};
use crate::core::models::dataset::Dataset;
use crate::core::models::layout::Layout;
use crate::core::models::results::ResultSchema;
use crate::core::models::settings::AnalysisSettings;
use crate::core::models::well::WellId;
use crate::core::preprocessing::PreprocessingPipeline;
use crate::engine::analyzer::DatasetAnalyzer;
use crate::engine::config::{
    AnalysisOptions, FitConfig, FitConfigBuilder, validate_model_settings,
};
use crate::engine::error::{EngineError, ValidationError};
use crate::engine::parallel::WorkerPool;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::core::utils::serde_nan;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Which datasets a settings change applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSelector {
    All,
    Named(String),
}

impl DatasetSelector {
    pub fn named(name: impl Into<String>) -> Self {
        DatasetSelector::Named(name.into())
    }
}

/// Settings reported only once the manager handles three-state models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThreeStateSettings {
    /// NaN for datasets that use a two-state model.
    #[serde(with = "serde_nan")]
    pub aggregation_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsRow {
    pub dataset: String,
    pub settings: AnalysisSettings,
    pub active_domain: (f64, f64),
    pub scan_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub three_state: Option<ThreeStateSettings>,
}

/// Owns the datasets of one plate together with the shared layout.
///
/// Every mutating call either succeeds completely or leaves the manager as it
/// was. The manager is not meant to be shared between threads while it is
/// being mutated; exports run on an [`ExportSnapshot`] instead.
pub struct MultiDatasetManager {
    layout: Layout,
    schema: ResultSchema,
    datasets: Vec<Dataset>,
    pipeline: PreprocessingPipeline,
    fit_config: FitConfig,
    scoring: Box<dyn ScoringStrategy>,
}

impl Default for MultiDatasetManager {
    fn default() -> Self {
        Self {
            layout: Layout::new(),
            schema: ResultSchema::default(),
            datasets: Vec::new(),
            pipeline: PreprocessingPipeline::default(),
            fit_config: FitConfig::default(),
            scoring: Box::new(RSquaredScore),
        }
    }
}

impl std::fmt::Debug for MultiDatasetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiDatasetManager")
            .field("datasets", &self.dataset_names())
            .field("schema", &self.schema)
            .field("scoring", &self.scoring.name())
            .finish()
    }
}

impl MultiDatasetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one dataset per readout of an import.
    pub fn from_import(import: PlateImport) -> Result<Self, LoadError> {
        if import.readouts.is_empty() {
            return Err(LoadError::Empty("readouts"));
        }
        let mut manager = Self::new();
        for readout in import.readouts {
            if manager.dataset(&readout.name).is_some() {
                return Err(LoadError::Duplicate {
                    kind: "readout",
                    name: readout.name,
                });
            }
            let mut dataset = Dataset::new(
                readout.name,
                readout.temperature,
                readout.signals,
                import.scan_rate,
            )?;
            dataset.log(format!("imported: scan_rate={}", import.scan_rate));
            manager.datasets.push(dataset);
        }
        manager.layout = Layout::from_labels(import.layout);
        info!(
            "Imported {} dataset(s) with {} labeled wells.",
            manager.datasets.len(),
            manager.layout.len()
        );
        Ok(manager)
    }

    pub fn with_pipeline(mut self, pipeline: PreprocessingPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_fit_config(mut self, fit_config: FitConfig) -> Self {
        self.fit_config = fit_config;
        self
    }

    pub fn with_scoring(mut self, scoring: impl ScoringStrategy + 'static) -> Self {
        self.scoring = Box::new(scoring);
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn schema(&self) -> ResultSchema {
        self.schema
    }

    pub fn is_three_state_aware(&self) -> bool {
        self.schema.is_three_state()
    }

    pub fn fit_config(&self) -> &FitConfig {
        &self.fit_config
    }

    pub fn dataset_names(&self) -> Vec<&str> {
        self.datasets.iter().map(Dataset::name).collect()
    }

    /// Datasets in insertion order, optionally without those set to `skip`.
    pub fn datasets(&self, no_skip: bool) -> Vec<&Dataset> {
        self.datasets
            .iter()
            .filter(|ds| !(no_skip && ds.is_skipped()))
            .collect()
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|ds| ds.name() == name)
    }

    pub fn add_dataset(&mut self, dataset: Dataset) -> Result<(), ValidationError> {
        if self.dataset(dataset.name()).is_some() {
            return Err(ValidationError::DuplicateDataset(dataset.name().to_string()));
        }
        self.schema = self.schema.widen(dataset.settings().model);
        info!("Added dataset '{}'.", dataset.name());
        self.datasets.push(dataset);
        Ok(())
    }

    pub fn del_dataset(&mut self, name: &str) -> Result<Dataset, ValidationError> {
        let index = self.index_of(name)?;
        info!("Removed dataset '{}'.", name);
        Ok(self.datasets.remove(index))
    }

    fn index_of(&self, name: &str) -> Result<usize, ValidationError> {
        self.datasets
            .iter()
            .position(|ds| ds.name() == name)
            .ok_or_else(|| ValidationError::UnknownDataset(name.to_string()))
    }

    fn targets(&self, selector: &DatasetSelector) -> Result<Vec<usize>, ValidationError> {
        match selector {
            DatasetSelector::All if self.datasets.is_empty() => {
                Err(ValidationError::NoDatasetsSelected)
            }
            DatasetSelector::All => Ok((0..self.datasets.len()).collect()),
            DatasetSelector::Named(name) => Ok(vec![self.index_of(name)?]),
        }
    }

    /// Applies a partial settings update to the selected datasets.
    ///
    /// The update is validated against every target before any of them is
    /// changed. Selecting a three-state model widens the result schema for
    /// the rest of the session.
    pub fn set_analysis_options(
        &mut self,
        selector: &DatasetSelector,
        options: &AnalysisOptions,
    ) -> Result<(), ValidationError> {
        let targets = self.targets(selector)?;

        let mut staged = Vec::with_capacity(targets.len());
        for &index in &targets {
            let dataset = &self.datasets[index];
            let next = options.apply_to(dataset.settings());
            validate_model_settings(&next)?;
            let wells: BTreeSet<WellId> = dataset.wells().collect();
            let domain = self.pipeline.validate(
                &next.preprocessing,
                &wells,
                dataset.temperature(),
                dataset.active_domain(),
            )?;
            staged.push((index, next, domain));
        }

        for (index, next, domain) in staged {
            let dataset = &mut self.datasets[index];
            if next.model.is_skip() && !dataset.is_skipped() {
                warn!("Dataset '{}' will not be fitted (model 'skip').", dataset.name());
            }
            self.schema = self.schema.widen(next.model);
            let entry = format!(
                "settings: model={} domain=[{:.2}, {:.2}] excluded={} blanks={}",
                next.model,
                domain.0,
                domain.1,
                next.preprocessing.exclude.len(),
                next.preprocessing.blanks.len()
            );
            if dataset.apply_settings(next, domain) {
                info!("Cleared stale results of dataset '{}'.", dataset.name());
            }
            dataset.log(entry);
        }
        Ok(())
    }

    /// Preprocesses and fits every dataset.
    ///
    /// Datasets are processed one after the other; the wells of each dataset
    /// are fitted on a pool of `n_jobs` workers. If any dataset fails, no
    /// dataset is updated.
    #[instrument(skip_all, name = "analysis_workflow")]
    pub fn prepare_and_analyse_all(
        &mut self,
        n_jobs: usize,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        let pool = WorkerPool::new(n_jobs)?;
        reporter.report(Progress::PhaseStart { name: "Analysis" });
        info!(
            "Analysing {} dataset(s) with {} worker(s){}.",
            self.datasets.len(),
            pool.n_jobs(),
            if pool.is_parallel() { "" } else { " (sequential)" }
        );

        let analyzer = DatasetAnalyzer::new(
            &self.pipeline,
            &self.fit_config,
            self.scoring.as_ref(),
            reporter,
        );
        let mut staged = self.datasets.clone();
        for dataset in staged.iter_mut() {
            analyzer.prepare_and_analyse(dataset, &pool)?;
        }
        self.datasets = staged;

        reporter.report(Progress::PhaseFinish);
        Ok(())
    }

    /// Preprocesses and fits a single dataset.
    pub fn prepare_and_analyse(
        &mut self,
        name: &str,
        n_jobs: usize,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        let index = self.index_of(name)?;
        let pool = WorkerPool::new(n_jobs)?;
        let analyzer = DatasetAnalyzer::new(
            &self.pipeline,
            &self.fit_config,
            self.scoring.as_ref(),
            reporter,
        );
        analyzer.prepare_and_analyse(&mut self.datasets[index], &pool)
    }

    pub fn get_analysis_settings(&self) -> Vec<SettingsRow> {
        self.datasets
            .iter()
            .map(|ds| {
                let settings = ds.settings();
                let three_state = self.schema.is_three_state().then(|| ThreeStateSettings {
                    aggregation_threshold: if settings.model.is_three_state() {
                        settings.aggregation_threshold
                    } else {
                        f64::NAN
                    },
                });
                SettingsRow {
                    dataset: ds.name().to_string(),
                    settings: settings.clone(),
                    active_domain: ds.active_domain(),
                    scan_rate: ds.scan_rate(),
                    three_state,
                }
            })
            .collect()
    }

    pub fn combine_results(
        &self,
        options: &CombineOptions,
    ) -> Result<CombinedResults, ValidationError> {
        let datasets: Vec<&Dataset> = self.datasets.iter().collect();
        combine(&datasets, &self.layout, self.schema, options)
    }

    /// Sets or clears condition labels; `None` removes a label.
    pub fn update_layout<I>(&mut self, edits: I)
    where
        I: IntoIterator<Item = (WellId, Option<String>)>,
    {
        self.layout.update(edits);
    }

    /// Restores the labels the layout had when it was loaded.
    pub fn reset_layout(&mut self) {
        self.layout.reset();
    }

    /// Replaces the layout with the contents of an `ID,Condition` CSV file.
    pub fn load_layout<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LoadError> {
        let layout = read_layout_from_path(path)?;
        info!("Loaded layout with {} labeled wells.", layout.len());
        self.layout.replace(layout);
        Ok(())
    }

    pub fn save_session<P: AsRef<Path>>(&self, path: P) -> Result<(), SchemaError> {
        SessionCodec::save(&self.session_body(), path)
    }

    /// Replaces layout, schema, datasets and the analysis setup with those of
    /// a session file. A rejected file leaves the manager unchanged.
    pub fn load_session<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SchemaError> {
        let body = SessionCodec::load(path)?;
        self.restore(body)
    }

    pub fn from_session<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let mut manager = Self::new();
        manager.load_session(path)?;
        Ok(manager)
    }

    pub fn session_body(&self) -> SessionBody {
        SessionBody {
            layout: self.layout.clone(),
            schema: self.schema,
            setup: self.setup(),
            datasets: self.datasets.clone(),
        }
    }

    fn setup(&self) -> AnalysisSetup {
        AnalysisSetup {
            stages: self.pipeline.stages().to_vec(),
            max_iterations: self.fit_config.max_iterations,
            ftol: self.fit_config.ftol,
            xtol: self.fit_config.xtol,
            reference_temperature: self.fit_config.reference_temperature,
            scoring: self.scoring.config(),
        }
    }

    /// Validates a decoded session against the engine and adopts it.
    pub fn restore(&mut self, body: SessionBody) -> Result<(), SchemaError> {
        for dataset in &body.datasets {
            validate_model_settings(dataset.settings()).map_err(|e| {
                SchemaError::Content(format!("dataset '{}': {}", dataset.name(), e))
            })?;
        }
        let pipeline = PreprocessingPipeline::with_stages(&body.setup.stages)
            .map_err(|e| SchemaError::Content(e.to_string()))?;
        let fit_config = FitConfigBuilder::new()
            .max_iterations(body.setup.max_iterations)
            .ftol(body.setup.ftol)
            .xtol(body.setup.xtol)
            .reference_temperature(body.setup.reference_temperature)
            .build()
            .map_err(|e| SchemaError::Content(e.to_string()))?;

        info!("Restored session with {} dataset(s).", body.datasets.len());
        self.layout = body.layout;
        self.schema = body.schema;
        self.datasets = body.datasets;
        self.pipeline = pipeline;
        self.fit_config = fit_config;
        match body.setup.scoring {
            Some(scoring) => self.scoring = scoring.strategy(),
            None => warn!(
                "Session does not record its scoring; keeping '{}'.",
                self.scoring.name()
            ),
        }
        Ok(())
    }

    /// A detached copy of the state exports are produced from.
    pub fn snapshot(&self) -> ExportSnapshot {
        ExportSnapshot {
            layout: self.layout.clone(),
            schema: self.schema,
            setup: self.setup(),
            datasets: self.datasets.clone(),
        }
    }

    pub fn write_output_all(
        &self,
        outfolder: &Path,
        options: &ExportOptions,
        n_jobs: usize,
        renderer: Option<&dyn ReportRenderer>,
    ) -> Result<Vec<PathBuf>, EngineError> {
        self.snapshot().write_all(outfolder, options, n_jobs, renderer)
    }
}
