//! Configuration module for filebox.

use serde::Deserialize;
use std::path::Path;

use crate::db::DEFAULT_STORAGE_LIMIT;
use crate::{FileboxError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/filebox.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Blob storage and quota configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding blob content.
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Storage limit assigned to new users, in bytes.
    #[serde(default = "default_user_limit")]
    pub default_user_limit: i64,
    /// Largest single upload accepted, in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: i64,
}

fn default_storage_path() -> String {
    "data/blobs".to_string()
}

fn default_user_limit() -> i64 {
    DEFAULT_STORAGE_LIMIT
}

fn default_max_upload_size() -> i64 {
    100 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            default_user_limit: default_user_limit(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Empty disables file output.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/filebox.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage and quota configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FileboxError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FileboxError::Config(format!("parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEBOX_DATABASE_PATH`: Override the database file path
    /// - `FILEBOX_STORAGE_PATH`: Override the blob directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FILEBOX_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(path) = std::env::var("FILEBOX_STORAGE_PATH") {
            if !path.is_empty() {
                self.storage.path = path;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(FileboxError::Config("database.path must be set".to_string()));
        }
        if self.storage.path.trim().is_empty() {
            return Err(FileboxError::Config("storage.path must be set".to_string()));
        }
        if self.storage.default_user_limit <= 0 {
            return Err(FileboxError::Config(
                "storage.default_user_limit must be positive".to_string(),
            ));
        }
        if self.storage.max_upload_size <= 0 {
            return Err(FileboxError::Config(
                "storage.max_upload_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
