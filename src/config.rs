//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::ingest::{IngestOptions, DEFAULT_CHUNK_SIZE};
use crate::storage::Compression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub compression: Compression,
}

fn default_db_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("scanstore").join("report.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./scanstore_data/report.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            compression: Compression::default(),
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_flush_every_chunk")]
    pub flush_every_chunk: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_flush_every_chunk() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            flush_every_chunk: default_flush_every_chunk(),
        }
    }
}

impl IngestConfig {
    pub fn options(&self) -> IngestOptions {
        IngestOptions {
            chunk_size: self.chunk_size,
            flush_every_chunk: self.flush_every_chunk,
        }
    }
}

/// Query configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page_size() -> u64 {
    20
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("scanstore").join("config.toml")),
            Some(PathBuf::from("./scanstore.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(db_path) = var("SCANSTORE_DB_PATH") {
            self.storage.db_path = db_path;
        }
        if let Some(compression) = var("SCANSTORE_COMPRESSION") {
            match compression.parse() {
                Ok(c) => self.storage.compression = c,
                Err(e) => tracing::warn!("Ignoring SCANSTORE_COMPRESSION: {}", e),
            }
        }

        // Ingest overrides
        if let Some(size) = var("SCANSTORE_CHUNK_SIZE") {
            if let Ok(size) = size.parse() {
                self.ingest.chunk_size = size;
            }
        }

        // Query overrides
        if let Some(size) = var("SCANSTORE_PAGE_SIZE") {
            if let Ok(size) = size.parse() {
                self.query.page_size = size;
            }
        }

        // Logging overrides
        if let Some(level) = var("SCANSTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("SCANSTORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# scanstore Configuration
#
# Environment variables override these settings:
# - SCANSTORE_DB_PATH
# - SCANSTORE_COMPRESSION
# - SCANSTORE_CHUNK_SIZE
# - SCANSTORE_PAGE_SIZE
# - SCANSTORE_LOG_LEVEL
# - SCANSTORE_LOG_FORMAT

[storage]
# SQLite database holding the ingested report
db_path = "~/.local/share/scanstore/report.db"

# Payload compression: lz4 or none
compression = "lz4"

[ingest]
# Bytes read per chunk
chunk_size = 65536

# Write test and happy path payloads after every chunk
flush_every_chunk = true

[query]
# Default page size for listings
page_size = 20

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/scanstore/scanstore.log"
"#
    .to_string()
}
