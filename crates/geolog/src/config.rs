//! Configuration management for geolog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{StoreOptions, DEFAULT_QUEUE_CAPACITY};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "geolog";

/// Prefix for environment overrides, e.g. `GEOLOG_STORAGE__DATA_FILE`.
const ENV_PREFIX: &str = "GEOLOG_";

/// Plain environment variable naming the listening port.
const PORT_ENV: &str = "PORT";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. The `PORT` environment variable (ignored when empty)
/// 2. Environment variables prefixed with `GEOLOG_`, nested keys split on `__`
/// 3. TOML config file at `~/.config/geolog/config.toml`
/// 4. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// HTML page served at `/` and `/index.html`.
    pub index_path: PathBuf,
    /// Take the client address from `X-Forwarded-For` when present.
    pub trust_forwarded_for: bool,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the collection file.
    pub data_file: PathBuf,
    /// Maximum number of writes waiting in the queue.
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            index_path: PathBuf::from("index.html"),
            trust_forwarded_for: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("locations.json"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        // An empty PORT means "unset", so it must not reach the extractor.
        if port_env_is_set() {
            figment = figment.merge(Env::raw().only(&[PORT_ENV]).map(|_| "server.port".into()));
        }

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "host must not be empty".to_string(),
            });
        }

        if self.server.max_body_bytes == 0 {
            return Err(Error::ConfigValidation {
                message: "max_body_bytes must be greater than 0".to_string(),
            });
        }

        if self.storage.queue_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "queue_capacity must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// The `host:port` pair to bind.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Options for opening the append store.
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            queue_capacity: self.storage.queue_capacity,
        }
    }
}

fn port_env_is_set() -> bool {
    std::env::var(PORT_ENV).is_ok_and(|value| !value.trim().is_empty())
}
