//! Per-well nonlinear fitting of unfolding models.

pub mod fitter;
pub mod lm;
pub mod models;
pub mod registry;
pub mod score;
