//! Analysis configuration assembled from built-in defaults, an optional TOML
//! file, `-S key=value` overrides and command-line flags, in increasing order
//! of precedence.

pub mod builder;
pub mod defaults;
pub mod file;
pub mod models;

pub use builder::build_config;
pub use models::{AppConfig, InputKind, ScoringChoice};
