//! TOML configuration.
//!
//! ```toml
//! [store]
//! path = "./data/apiary.json"
//!
//! [http]
//! timeout_secs = 30
//! user_agent = "apiary"
//!
//! [log]
//! level = "info"
//! ```
//!
//! Only `[store]` is required.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// The backing JSON document. Created on first write.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("apiary/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// A config pointing at `path` with every optional section defaulted.
    pub fn with_store_path(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig { path: path.into() },
            http: HttpConfig::default(),
            log: LogConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.store.path.as_os_str().is_empty() {
        anyhow::bail!("store.path must not be empty");
    }

    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be > 0");
    }

    match config.log.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!(
            "Unknown log level: '{}'. Must be trace, debug, info, warn, or error.",
            other
        ),
    }

    Ok(config)
}
