//! TOML-based configuration persistence for the node daemon.
//!
//! Reads and writes [`NodeConfig`] at the platform-appropriate config file:
//! - Windows:  `%APPDATA%\deskring\config.toml`
//! - Linux:    `~/.config/deskring/config.toml`
//! - macOS:    `~/Library/Application Support/deskring/config.toml`
//!
//! Every field carries a serde default so the daemon works on first run
//! (before a config file exists) and when upgrading from an older file that
//! is missing newer fields. Only the configuration persists — replicated
//! protocol state (order, tokens) is deliberately in-memory only.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub selection: SelectionSection,
}

/// Identity and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// Node id override. Empty means "derive from user and host".
    #[serde(default)]
    pub name: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Peer transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// IP address to bind the peer listener to. `"0.0.0.0"` binds all
    /// interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// First port tried for the peer listener.
    #[serde(default = "default_port_min")]
    pub port_min: u16,
    /// Last port tried for the peer listener.
    #[serde(default = "default_port_max")]
    pub port_max: u16,
}

/// Selection fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionSection {
    /// Watchdog bound for one selection fetch round-trip, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port_min() -> u16 {
    7421
}
fn default_port_max() -> u16 {
    7470
}
fn default_fetch_timeout_ms() -> u64 {
    5000
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port_min: default_port_min(),
            port_max: default_port_max(),
        }
    }
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl NodeConfig {
    /// The node id: the configured override, or `"<user>'s desktop on
    /// <host>"` derived from the environment.
    ///
    /// Discovery may still rename the node once at startup when the service
    /// name collides on the LAN.
    pub fn node_id(&self) -> String {
        if !self.node.name.is_empty() {
            return self.node.name.clone();
        }
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "desktop".to_string());
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "localhost".to_string());
        format!("{user}'s desktop on {host}")
    }
}

// ── Load / save ───────────────────────────────────────────────────────────────

/// Returns the platform config directory for deskring.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Returns the full path of the config file.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config, falling back to defaults when no file exists.
///
/// # Errors
///
/// Returns [`ConfigError`] for unreadable or unparseable files — an
/// *existing but broken* config is reported rather than silently replaced.
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    let path = config_path()?;
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let config: NodeConfig = toml::from_str(&content)?;
            Ok(config)
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(NodeConfig::default()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// Saves the config, creating the directory when needed.
///
/// # Errors
///
/// Returns [`ConfigError`] on serialization or I/O failure.
pub fn save_config(config: &NodeConfig) -> Result<(), ConfigError> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
        path: dir.clone(),
        source,
    })?;
    let path = dir.join("config.toml");
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|base| PathBuf::from(base).join("deskring"))
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("deskring"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library/Application Support/deskring"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
