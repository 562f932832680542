//! Reading and writing plate data, layouts, result tables and sessions.

pub mod error;
pub mod export;
pub mod import;
pub mod layout_csv;
pub mod plain_csv;
pub mod session;
pub mod traits;
