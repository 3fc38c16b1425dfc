use crate::core::db::{ConnectOptions, Credentials, Database};
use crate::core::{RecordError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Missing rows on `get` fail with `NoResult` instead of returning `None`
    #[serde(default = "default_debug")]
    pub debug: bool,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Database credentials and location.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub name: String,
    pub data_dir: Option<PathBuf>,
    pub create_if_missing: bool,
}

/// Logging configuration.
#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`; defaults to `info`
    pub level: Option<String>,
    /// Append to this file instead of writing to stderr
    pub file: Option<PathBuf>,
    /// Also append error events to this file
    pub error_file: Option<PathBuf>,
}

fn default_debug() -> bool {
    true
}

impl Default for Config {
    /// The development defaults: local `test` database, debug on.
    fn default() -> Self {
        Config {
            debug: default_debug(),
            database: DatabaseConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            host: "localhost".to_string(),
            user: "root".to_string(),
            pass: String::new(),
            name: "test".to_string(),
            data_dir: None,
            create_if_missing: false,
        }
    }
}

impl DatabaseConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.host, &self.user, &self.pass, &self.name)
    }
}

impl Config {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            data_dir: self.database.data_dir.clone(),
            create_if_missing: self.database.create_if_missing,
            debug: self.debug,
        }
    }

    /// Opens the configured database with this configuration's debug flag.
    pub fn open_database(&self) -> Result<Database> {
        Database::open(&self.database.credentials(), &self.connect_options())
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = recordkit::config::load_config("recordkit.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| RecordError::Config(e.to_string()))
}
