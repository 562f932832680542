//! # Engine Module
//!
//! Turns a dataset and its settings into derived curves and fit results.
//!
//! - **Configuration** ([`config`]) - optimizer limits and partial settings updates
//! - **Analysis** ([`analyzer`]) - preprocessing followed by one fit per well
//! - **Workers** ([`parallel`]) - the bounded pool fits are scheduled on
//! - **Progress Monitoring** ([`progress`]) - callbacks for long-running calls
//! - **Error Handling** ([`error`]) - validation, export and umbrella errors
//!
//! Nothing in this layer owns a dataset; the workflows layer decides when an
//! analysis outcome is committed.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod parallel;
pub mod progress;
