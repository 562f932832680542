pub mod curve;
pub mod dataset;
pub mod layout;
pub mod results;
pub mod settings;
pub mod well;
