//! # meltscan
//!
//! Thermal unfolding analysis for 96-well plates: signal conditioning,
//! per-well fits of equilibrium and kinetic unfolding models, multi-readout
//! summaries and self-contained session files.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Stateless data model (`WellId`, `Curve`,
//!   `Dataset`, `ResultTable`), the preprocessing filters, the model registry
//!   and the bounded Levenberg-Marquardt optimizer, and the file codecs.
//!
//! - **[`engine`]: The Logic Core.** Settings validation, the worker pool and
//!   the `DatasetAnalyzer` that turns one dataset into derived curves and
//!   one result row per well.
//!
//! - **[`workflows`]: The Public API.** `MultiDatasetManager` ties the layers
//!   together: import, settings, analysis, combined results, layout edits,
//!   sessions and exports.
//!
//! ```no_run
//! use meltscan::core::io::plain_csv::{PlainCsv, PlainCsvOptions};
//! use meltscan::engine::progress::ProgressReporter;
//! use meltscan::workflows::{CombineOptions, MultiDatasetManager};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = std::fs::File::open("plate.csv")?;
//! let import = PlainCsv::read_with(file, &PlainCsvOptions::default())?;
//! let mut manager = MultiDatasetManager::from_import(import)?;
//! manager.prepare_and_analyse_all(4, &ProgressReporter::new())?;
//! let summary = manager.combine_results(&CombineOptions::new())?;
//! # let _ = summary;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod engine;
pub mod workflows;
