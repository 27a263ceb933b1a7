//! Daemon configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Worker pool settings
    #[serde(default)]
    pub workers: WorkersConfig,
    /// Apply job settings
    #[serde(default)]
    pub apply: ApplyConfig,
    /// Device discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// IPC settings
    #[serde(default)]
    pub ipc: IpcConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Database path (optional, uses default if not set)
    pub path: Option<PathBuf>,
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Number of jobs that may run at once
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { count: default_worker_count() }
    }
}

impl WorkersConfig {
    /// Configured worker count, never below one.
    #[must_use]
    pub fn effective_count(&self) -> usize {
        self.count.max(1)
    }
}

fn default_worker_count() -> usize {
    2
}

/// Apply job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Validate a pipeline before applying or unapplying it
    #[serde(default = "default_true")]
    pub validate_before_run: bool,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self { validate_before_run: true }
    }
}

/// Device discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Seconds between discovery rounds; 0 disables discovery
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { interval_secs: default_interval_secs() }
    }
}

fn default_interval_secs() -> u64 {
    30
}

/// IPC settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IpcConfig {
    /// Socket path (optional, uses the runtime dir if not set)
    pub socket_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

/// Load configuration from file or defaults.
pub fn load_config() -> Result<Config> {
    let config_path = config_path()?;

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        parse_config(&content).with_context(|| format!("Failed to parse config file: {config_path:?}"))
    } else {
        info!(?config_path, "Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Parse configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "patchbay", "Patchbay").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}
