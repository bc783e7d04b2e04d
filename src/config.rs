//! YAML configuration for adbot.
//!
//! One file configures the store, the floor policy, report sizes and the HTTP
//! server. Every field has a default, so an empty file (or no file at all)
//! yields a working setup.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1"
//!
//! store:
//!   path: "adbot.redb"
//!
//! floor:
//!   per_viewer_cents: 10
//!   multiplier: 10
//!   cooldown_threshold: 20
//!
//! ledger:
//!   page_size: 20
//!
//! scoreboard:
//!   size: 10
//!
//! server:
//!   bind_addr: "0.0.0.0"
//!   port: 8080
//!   timeout_secs: 30
//!   pending_ttl_secs: 300
//!   api_keys: ["change-me"]
//!   control_rooms: ["adbot-control"]
//!   ghost: false
//!   log_level: "info"
//!   metrics_enabled: true
//! ```

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::floor::LinearFloor;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ADBOT_CONFIG";

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdbotConfig {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub floor: LinearFloor,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub scoreboard: ScoreboardConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl AdbotConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: AdbotConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `$ADBOT_CONFIG` if set, otherwise fall back to defaults.
    pub fn load() -> Result<Self, ConfigLoadError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigLoadError::Validation(
                "store.path must not be empty".into(),
            ));
        }
        if self.floor.per_viewer_cents < 0 || self.floor.multiplier < 0 {
            return Err(ConfigLoadError::Validation(
                "floor.per_viewer_cents and floor.multiplier must be non-negative".into(),
            ));
        }
        if self.ledger.page_size == 0 {
            return Err(ConfigLoadError::Validation(
                "ledger.page_size must be at least 1".into(),
            ));
        }
        if self.server.timeout_secs == 0 {
            return Err(ConfigLoadError::Validation(
                "server.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for AdbotConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            store: StoreConfig::default(),
            floor: LinearFloor::default(),
            ledger: LedgerConfig::default(),
            scoreboard: ScoreboardConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Entries shown by the ledger report.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreboardConfig {
    /// Rows shown on the scoreboard; `0` shows everyone.
    #[serde(default = "default_scoreboard_size")]
    pub size: usize,
}

impl Default for ScoreboardConfig {
    fn default() -> Self {
        Self {
            size: default_scoreboard_size(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long a selection issued with `deliver: false` stays claimable.
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,

    /// Accepted API keys. Empty disables authentication.
    #[serde(default)]
    pub api_keys: HashSet<String>,

    /// Rooms that receive delivery notices.
    #[serde(default)]
    pub control_rooms: Vec<String>,

    /// Bill and count ads without returning the reply text.
    #[serde(default)]
    pub ghost: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            pending_ttl_secs: default_pending_ttl_secs(),
            api_keys: HashSet::new(),
            control_rooms: Vec::new(),
            ghost: false,
            log_level: default_log_level(),
            metrics_enabled: default_true(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigLoadError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|err| ConfigLoadError::Validation(format!("bad bind address: {err}")))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}

fn default_version() -> String {
    "1".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("adbot.redb")
}

fn default_page_size() -> usize {
    20
}

fn default_scoreboard_size() -> usize {
    10
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pending_ttl_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
