//! TOML-based configuration for the query engine.
//!
//! Example configuration:
//! ```toml
//! dialect = "postgres"
//!
//! # Fetch an un-loaded field or relation on access instead of failing.
//! lazy_refetch = false
//!
//! # Maximum keys per batched secondary statement.
//! batch_size = 500
//!
//! # Issue independent batched relations concurrently.
//! concurrent_batches = true
//!
//! # Memoize compiled statements by plan fingerprint.
//! compile_cache = true
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::dialect::Dialect;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "QUARRY_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// SQL dialect statements are rendered in.
    pub dialect: Dialect,

    /// Opt into transparent single-row fetches for un-loaded fields and relations.
    pub lazy_refetch: bool,

    /// Maximum number of keys bound into one batched secondary statement.
    pub batch_size: usize,

    /// Issue secondary statements for independent relations concurrently.
    pub concurrent_batches: bool,

    /// Memoize compiled statements keyed by plan fingerprint.
    pub compile_cache: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            lazy_refetch: false,
            batch_size: 500,
            concurrent_batches: true,
            compile_cache: true,
        }
    }
}

impl EngineSettings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: EngineSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `<config dir>/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(EngineSettings::default())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.batch_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    #[must_use]
    pub fn with_lazy_refetch(mut self, enabled: bool) -> Self {
        self.lazy_refetch = enabled;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_concurrent_batches(mut self, enabled: bool) -> Self {
        self.concurrent_batches = enabled;
        self
    }

    #[must_use]
    pub fn with_compile_cache(mut self, enabled: bool) -> Self {
        self.compile_cache = enabled;
        self
    }
}
