use std::io;
use thiserror::Error;

/// Input that cannot become a dataset: unreadable, malformed or inconsistent.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed input at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("Input contains no {0}")]
    Empty(&'static str),

    #[error("Temperature axis must be strictly ascending (violated at index {index})")]
    UnsortedTemperature { index: usize },

    #[error("Well {well} has {found} values but the temperature axis has {expected}")]
    LengthMismatch {
        well: String,
        expected: usize,
        found: usize,
    },

    #[error("Non-finite value in {context}")]
    NonFinite { context: String },

    #[error("Duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("Invalid metadata: {0}")]
    Metadata(String),
}

/// A session document that cannot be restored.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognized document format '{0}'")]
    Format(String),

    #[error("Unsupported session version {found} (supported: {supported})")]
    Version { found: u64, supported: u64 },

    #[error("Session content is inconsistent: {0}")]
    Content(String),
}
