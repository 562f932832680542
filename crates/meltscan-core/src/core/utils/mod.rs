pub mod serde_nan;
