//! Configuration management for the ledger

use crate::cache::DEFAULT_BLOCK_CACHE_SIZE;
use crate::error::{ChainError, Result};
use crate::miner::MAX_DIFFICULTY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            block_cache_size: default_block_cache_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Leading zero bits required of every block hash.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)
            .map_err(|e| ChainError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ChainError::Config("database.path must be set".to_string()));
        }
        if self.database.block_cache_size == 0 {
            return Err(ChainError::Config(
                "database.block_cache_size must be greater than zero".to_string(),
            ));
        }
        if self.miner.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::Config(format!(
                "miner.difficulty {} exceeds the maximum of {}",
                self.miner.difficulty, MAX_DIFFICULTY
            )));
        }
        self.logging.level.parse::<tracing::Level>().map_err(|_| {
            ChainError::Config(format!("unknown logging.level '{}'", self.logging.level))
        })?;
        Ok(())
    }

    /// Parsed `logging.level`, falling back to INFO.
    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

/// Load configuration from `path` (or `config.toml`), using defaults when the
/// file does not exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let config_str = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(ChainError::Config(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    if config_str.trim().is_empty() {
        return Ok(Config::default());
    }
    Config::from_toml(&config_str)
}

fn default_db_path() -> String {
    "./data/ledger.db".to_string()
}

fn default_block_cache_size() -> usize {
    DEFAULT_BLOCK_CACHE_SIZE
}

fn default_difficulty() -> u32 {
    crate::blockchain::DEFAULT_DIFFICULTY
}

fn default_log_level() -> String {
    "info".to_string()
}
