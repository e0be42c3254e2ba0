use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_DURATION_SECS, MAX_UPLOAD_BYTES};
use crate::recordings::RecordingLimits;

fn default_port() -> u16 {
    3000
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_upload_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}

fn default_max_duration_secs() -> u32 {
    MAX_DURATION_SECS
}

/// Server configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// SQLite database holding recordings and their chunks (created if missing)
    pub database_path: PathBuf,
    /// HTTP port (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bytes per stored chunk (default: 255 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Largest accepted upload in bytes (default: 100 MB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Longest accepted recording in seconds (default: 180)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u32,
}

impl ServerConfig {
    /// Config with defaults for everything but the database path
    pub fn with_database(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            port: default_port(),
            chunk_size: default_chunk_size(),
            max_upload_bytes: default_max_upload_bytes(),
            max_duration_secs: default_max_duration_secs(),
        }
    }

    /// Read and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database_path.as_os_str().is_empty() {
            return Err("database_path must not be empty".to_string());
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(format!(
                "chunk_size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }
        if self.max_duration_secs == 0 {
            return Err("max_duration_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn limits(&self) -> RecordingLimits {
        RecordingLimits {
            max_size_bytes: self.max_upload_bytes,
            max_duration_secs: self.max_duration_secs,
        }
    }
}
