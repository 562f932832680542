//! # Workflows Module
//!
//! The public entry points of the library.
//!
//! - **Manager** ([`manager`]) - owns the datasets of a plate and the shared
//!   layout, applies settings, runs analyses and persists sessions
//! - **Combining** ([`combine`]) - per-well summaries across datasets
//! - **Export** ([`export`]) - tables, reports and session files on disk

pub mod combine;
pub mod export;
pub mod manager;

pub use combine::{CombineMode, CombineOptions, CombinedResults, DatasetTables};
pub use export::{
    ExportOptions, ExportSnapshot, HtmlSummaryReport, ReportFormat, ReportRenderer,
};
pub use manager::{DatasetSelector, MultiDatasetManager, SettingsRow, ThreeStateSettings};
