// Library interface for testing

// Declare all modules
pub mod assembler;
pub mod capture;
pub mod chunk_store;
pub mod client;
pub mod config;
pub mod constants;
pub mod db;
pub mod errors;
pub mod queries;
pub mod range;
pub mod recordings;
pub mod schema;
pub mod serve;
pub mod upload;

// Re-export the expected database version for convenience
pub use constants::EXPECTED_DB_VERSION;
