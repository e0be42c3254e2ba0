//! SQL builders for the SQLite schema, one module per table.

pub mod chunks;
pub mod ddl;
pub mod files;
pub mod metadata;
pub mod recordings;
