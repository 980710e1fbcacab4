//! Engine configuration.
//!
//! Configuration is read from a TOML file. Every field has a default, so an
//! empty or missing file yields a working in-memory engine.

use rights_core::error::{Error, Result};
use rights_core::utils::LogLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default wait for a usage lock, in milliseconds.
pub const DEFAULT_USAGE_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Default SQLite busy timeout, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors that can occur in configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// SQLite backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file
    #[serde(default = "default_sqlite_path")]
    pub path: PathBuf,

    /// How long SQLite waits on a locked database (milliseconds)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("rights.db")
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl SqliteConfig {
    /// Configuration for a database file with the default busy timeout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    /// The busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::new(default_sqlite_path())
    }
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local maps. Nothing survives a restart.
    Memory,

    /// A SQLite database file.
    Sqlite(SqliteConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log verbosity
    #[serde(default)]
    pub log_level: LogLevel,

    /// Bounded wait for a usage lock (milliseconds)
    #[serde(default = "default_usage_lock_timeout_ms")]
    pub usage_lock_timeout_ms: u64,

    /// Storage backend
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_usage_lock_timeout_ms() -> u64 {
    DEFAULT_USAGE_LOCK_TIMEOUT_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            usage_lock_timeout_ms: default_usage_lock_timeout_ms(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file
    ///
    /// A missing path, or a path that does not exist, yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                let content = fs::read_to_string(path).map_err(|err| {
                    ConfigError::LoadFailed(format!("{}: {}", path.display(), err))
                })?;
                Self::from_toml_str(&content)?
            }
            Some(path) => {
                warn!("Configuration file not found: {}", path.display());
                Self::default()
            }
            None => {
                info!("No configuration file specified, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without validating it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| ConfigError::ParseFailed(err.to_string()).into())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.usage_lock_timeout_ms == 0 {
            return Err(
                ConfigError::Invalid("Usage lock timeout cannot be zero".to_string()).into(),
            );
        }

        if let StorageConfig::Sqlite(sqlite) = &self.storage {
            if sqlite.path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("SQLite path cannot be empty".to_string()).into());
            }
            if sqlite.busy_timeout_ms == 0 {
                return Err(
                    ConfigError::Invalid("SQLite busy timeout cannot be zero".to_string()).into(),
                );
            }
        }

        Ok(())
    }

    /// The usage lock timeout as a duration.
    pub fn usage_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.usage_lock_timeout_ms)
    }

    /// Switch to a SQLite database at `path`, keeping any configured busy timeout.
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        let busy_timeout_ms = match &self.storage {
            StorageConfig::Sqlite(sqlite) => sqlite.busy_timeout_ms,
            StorageConfig::Memory => default_busy_timeout_ms(),
        };
        self.storage = StorageConfig::Sqlite(SqliteConfig {
            path: path.into(),
            busy_timeout_ms,
        });
        self
    }
}
