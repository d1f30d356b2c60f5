//! Runtime configuration.
//!
//! Defaults cover a local store; a JSON file can override any of them:
//!
//! ```json
//! {
//!   "database": { "path": "merchcoin.db", "max_connections": 5 },
//!   "initial_balance": 1000,
//!   "catalog": [{ "name": "t-shirt", "price": 80 }]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CatalogSeed, Coins, INITIAL_BALANCE, default_catalog};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Coins granted to each newly opened account
    pub initial_balance: Coins,
    /// Merch seeded into the catalog at startup (insert-if-absent by name)
    pub catalog: Vec<CatalogSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            initial_balance: INITIAL_BALANCE,
            catalog: default_catalog(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_json(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database.path = path.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_balance < 0 {
            return Err(ConfigError::Invalid(
                "initial_balance cannot be negative".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for item in &self.catalog {
            if item.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "catalog item names cannot be empty".to_string(),
                ));
            }
            if item.price <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "catalog item '{}' must have a positive price",
                    item.name
                )));
            }
            if !seen.insert(item.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "catalog item '{}' is listed twice",
                    item.name
                )));
            }
        }
        Ok(())
    }
}

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file; created if missing
    pub path: PathBuf,
    pub max_connections: u32,
    /// How long a writer waits for the database lock before giving up
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("merchcoin.db"),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
