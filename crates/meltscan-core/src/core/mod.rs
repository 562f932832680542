//! # Core Module
//!
//! Stateless building blocks of the analysis: the plate data model, numerical
//! routines, the signal-conditioning pipeline, the unfolding models and their
//! fitter, and file I/O.
//!
//! ## Architecture
//!
//! - **Data Model** ([`models`]) - Wells, layouts, curves, datasets, settings and result tables
//! - **Numerics** ([`math`]) - Polynomial least squares and summary statistics
//! - **Signal Conditioning** ([`preprocessing`]) - The ordered preprocessing pipeline and its filters
//! - **Model Fitting** ([`fitting`]) - Model registry, bounded Levenberg-Marquardt and per-well fitting
//! - **File I/O** ([`io`]) - Import adapters, layout files, CSV exports and session documents
//!
//! Temperatures are in kelvin, energies in kJ/mol and scan rates in K/min throughout.

pub mod fitting;
pub mod io;
pub mod math;
pub mod models;
pub mod preprocessing;
pub mod utils;
