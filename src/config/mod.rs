//! Configuration management for syncclip
//!
//! A single TOML file drives both the hub (`serve`) and the HTTP client
//! commands (`push`/`pull`). Every field has a default, so a missing file is
//! not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::sync::HubConfig;

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "SYNCCLIP_CONFIG";

/// File name looked up inside the per-user config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Address the hub listens on, e.g. `":2352"` or `"127.0.0.1:2352"`
    #[serde(default = "default_port")]
    pub port: String,

    /// Base URL the `push`/`pull` commands talk to
    #[serde(default = "default_url")]
    pub url: String,

    /// Peer hubs to keep an outbound connection to
    #[serde(default)]
    pub peers: Vec<String>,

    /// Hub tuning
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Hub tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Capacity of each peer's outbound queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delay between failed dial attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Clipboard polling period, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the hub's event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_port() -> String {
    ":2352".to_string()
}

fn default_url() -> String {
    "http://localhost:2352".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    64
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            retry_delay_ms: default_retry_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            url: default_url(),
            peers: Vec::new(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Checks in order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. Path from the SYNCCLIP_CONFIG environment variable
    /// 3. `<config dir>/sync-clip/config.toml`
    ///
    /// A file that does not exist yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(expand_path(path)),
            None => Self::find_config_path(),
        };

        match path {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path, defaults if it does not exist
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parse, normalize and validate configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml_str)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        base_config_dir().join("sync-clip").join(CONFIG_FILE)
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Some(expand_path(Path::new(&path)));
            }
        }

        Some(Self::default_path())
    }

    /// Bring shorthand addresses into canonical form
    pub fn normalize(&mut self) {
        self.port = normalize_port(&self.port);
        self.url = normalize_url(&self.url);
        for peer in &mut self.peers {
            *peer = normalize_peer(peer);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.queue_capacity < 1 {
            return Err(ConfigError::Validation(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.sync.retry_delay_ms < 1 {
            return Err(ConfigError::Validation(
                "retry_delay_ms must be at least 1".to_string(),
            ));
        }
        if self.sync.poll_interval_ms < 10 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be at least 10".to_string(),
            ));
        }

        Ok(())
    }

    /// Listen address in a form `SocketAddr` parsing accepts
    pub fn listen_addr(&self) -> String {
        if self.port.starts_with(':') {
            format!("0.0.0.0{}", self.port)
        } else {
            self.port.clone()
        }
    }

    /// Hub settings derived from the `[sync]` table
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.sync.queue_capacity,
            event_capacity: self.sync.event_capacity,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.sync.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync.poll_interval_ms)
    }
}

fn normalize_port(port: &str) -> String {
    if port.is_empty() || port.contains(':') {
        port.to_string()
    } else {
        format!(":{}", port)
    }
}

fn normalize_url(url: &str) -> String {
    if url.is_empty() || url.contains("://") {
        return url.to_string();
    }

    if url.contains(':') {
        format!("http://{}", url)
    } else {
        format!("http://localhost:{}", url)
    }
}

fn normalize_peer(peer: &str) -> String {
    if peer.contains("://") {
        return peer.to_string();
    }

    if peer.ends_with("/ws") {
        format!("ws://{}", peer)
    } else {
        format!("ws://{}/ws", peer.trim_end_matches('/'))
    }
}

// macOS users expect ~/.config rather than ~/Library/Application Support
fn base_config_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".config");
        }
    }

    dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}
