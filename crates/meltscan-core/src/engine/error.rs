use crate::core::fitting::registry::UnknownModelError;
use crate::core::io::error::{LoadError, SchemaError};
use crate::core::models::results::UnknownMetric;
use crate::core::preprocessing::PreprocessingError;
use thiserror::Error;

/// Rejected settings or requests. The targeted state is never modified.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Preprocessing(#[from] PreprocessingError),

    #[error(transparent)]
    UnknownModel(#[from] UnknownModelError),

    #[error(transparent)]
    UnknownMetric(#[from] UnknownMetric),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("No datasets selected")]
    NoDatasetsSelected,

    #[error("Unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("Dataset '{0}' already exists")]
    DuplicateDataset(String),

    #[error("Number of jobs must be at least 1")]
    InvalidJobs,

    #[error("Datasets '{first}' and '{second}' would both be written as '{stem}_*.csv'")]
    FileNameCollision {
        first: String,
        second: String,
        stem: String,
    },

    #[error("No renderer available for report format '{0}'")]
    NoRenderer(&'static str),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Session error: {0}")]
    Session(#[from] SchemaError),

    #[error("Rendering the {format} report failed: {message}")]
    Render {
        format: &'static str,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl From<PreprocessingError> for EngineError {
    fn from(error: PreprocessingError) -> Self {
        EngineError::Validation(error.into())
    }
}
