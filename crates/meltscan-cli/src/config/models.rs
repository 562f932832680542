use meltscan::core::fitting::score::{NormalizedRmseScore, RSquaredScore};
use meltscan::core::io::plain_csv::PlainCsvOptions;
use meltscan::core::preprocessing::PreprocessingPipeline;
use meltscan::engine::config::{AnalysisOptions, FitConfig};
use meltscan::workflows::{ExportOptions, MultiDatasetManager};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Csv,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringChoice {
    RSquared,
    NormalizedRmse,
}

impl ScoringChoice {
    pub fn install(self, manager: MultiDatasetManager) -> MultiDatasetManager {
        match self {
            ScoringChoice::RSquared => manager.with_scoring(RSquaredScore),
            ScoringChoice::NormalizedRmse => manager.with_scoring(NormalizedRmseScore::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub input_path: PathBuf,
    pub input_kind: InputKind,
    pub output_dir: PathBuf,
    pub layout_path: Option<PathBuf>,
    pub import: PlainCsvOptions,
    /// Engine setup overrides; `None` keeps the manager's (or the session's) value.
    pub pipeline: Option<PreprocessingPipeline>,
    pub analysis: AnalysisOptions,
    pub fit: Option<FitConfig>,
    pub scoring: Option<ScoringChoice>,
    pub export: ExportOptions,
}
