use crate::core::{OrmError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

/// Connection pool and worker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Engine busy-timeout applied when a handle is opened
    pub busy_timeout_ms: u64,
    /// Worker threads backing the non-blocking operations
    pub workers: usize,
    /// Log every statement at debug level
    pub trace: bool,
    /// Log elapsed time of every operation
    pub time_execution: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            busy_timeout_ms: 5000,
            workers: 2,
            trace: false,
            time_execution: false,
        }
    }
}

impl PoolConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Storage location configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
}

/// Pragmas applied to every handle after it is opened.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub foreign_keys: bool,
    pub journal_mode: Option<String>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        SqliteConfig {
            foreign_keys: true,
            journal_mode: None,
        }
    }
}

const JOURNAL_MODES: [&str; 6] = ["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];

impl SqliteConfig {
    /// Rejects settings that would not form a valid pragma.
    pub fn validate(&self) -> Result<()> {
        if let Some(mode) = &self.journal_mode {
            if !JOURNAL_MODES.contains(&mode.to_uppercase().as_str()) {
                return Err(OrmError::Config(format!("unknown journal_mode '{}'", mode)));
            }
        }
        Ok(())
    }

    /// The pragma statements to run after opening a handle.
    ///
    /// Validates first, so a configuration built in code cannot inject text
    /// into the statement.
    pub fn pragmas(&self) -> Result<Vec<String>> {
        self.validate()?;
        let mut pragmas = vec![format!(
            "PRAGMA foreign_keys = {}",
            if self.foreign_keys { "ON" } else { "OFF" }
        )];
        if let Some(mode) = &self.journal_mode {
            pragmas.push(format!("PRAGMA journal_mode = {}", mode.to_uppercase()));
        }
        Ok(pragmas)
    }
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(content).map_err(|e| OrmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            return Err(OrmError::Config("pool.workers must be at least 1".to_string()));
        }
        self.sqlite.validate()
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = liteorm::config::load_config("liteorm.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}
