//! # tb-config
//!
//! Layered settings: built-in defaults, then an optional TOML file, then
//! `TRIPBOARD__`-prefixed environment variables (`TRIPBOARD__DATABASE__URL`).
//! A `.env` file in the working directory is loaded first when present.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "tripboard.toml";
const ENV_PREFIX: &str = "TRIPBOARD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Any sqlx SQLite URL, e.g. `sqlite://tripboard.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl DatabaseSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
}

impl Settings {
    /// Loads `.env`, then builds settings with `file` (or `tripboard.toml`) as
    /// the optional file layer.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(ConfigError::Invalid(format!(".env: {err}"))),
        }

        let builder = Config::builder()
            .set_default("database.url", "sqlite://tripboard.db")?
            .set_default("database.max_connections", 5)?
            .set_default("database.busy_timeout_ms", 5000)?
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?;

        let builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url is empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
