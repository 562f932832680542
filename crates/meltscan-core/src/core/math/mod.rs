pub mod polynomial;
pub mod stats;
