//! Configuration management.

use crate::error::{BerthError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Persistent configuration for berth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix of every managed container, volume and label
    pub prefix: String,
    /// Shared network all instances join
    pub network: String,
    /// Domain used for reverse-proxy host rules (`<instance>.<domain>`)
    pub domain: String,
    pub proxy_entrypoint: String,
    pub stop_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub init_timeout_secs: u64,
    pub log_level: String,
    /// YAML catalog overlaid on the built-in one
    pub catalog_path: Option<String>,
    /// Hosts file maintained for instance hostnames
    pub hosts_file: Option<String>,
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: "berth".to_string(),
            network: "berth".to_string(),
            domain: "localhost".to_string(),
            proxy_entrypoint: "web".to_string(),
            stop_timeout_secs: 10,
            settle_delay_ms: 1000,
            init_timeout_secs: 300,
            log_level: "info".to_string(),
            catalog_path: None,
            hosts_file: None,
            data_dir: paths::data_dir().to_string_lossy().to_string(),
        }
    }
}

impl Config {
    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        paths::data_dir().join("config.json")
    }

    /// Load configuration from disk, then apply `BERTH_*` environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let config = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| BerthError::InvalidConfig {
                reason: format!("Failed to read config: {}", e),
            })?;
            serde_json::from_str(&content).map_err(|e| BerthError::InvalidConfig {
                reason: format!("Failed to parse config: {}", e),
            })?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Save configuration to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BerthError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| BerthError::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(&path, content).map_err(|e| BerthError::Io { path, source: e })
    }

    fn with_env_overrides(mut self) -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        if let Some(v) = var("BERTH_PREFIX") {
            self.prefix = v;
        }
        if let Some(v) = var("BERTH_NETWORK") {
            self.network = v;
        }
        if let Some(v) = var("BERTH_DOMAIN") {
            self.domain = v;
        }
        if let Some(v) = var("BERTH_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = var("BERTH_CATALOG") {
            self.catalog_path = Some(v);
        }
        self
    }

    /// SQLite database holding instance state.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("berth.db")
    }

    /// Hosts file the registrar maintains.
    pub fn hosts_file_path(&self) -> PathBuf {
        match &self.hosts_file {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.data_dir).join("hosts"),
        }
    }

    /// Orchestrator knobs derived from this configuration.
    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            prefix: self.prefix.clone(),
            network: self.network.clone(),
            domain: self.domain.clone(),
            proxy_entrypoint: self.proxy_entrypoint.clone(),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            init_timeout: Duration::from_secs(self.init_timeout_secs),
        }
    }
}

/// Runtime knobs shared by the orchestrator and the label generator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub prefix: String,
    pub network: String,
    pub domain: String,
    pub proxy_entrypoint: String,
    /// Grace period before a stop is forced
    pub stop_timeout: Duration,
    /// Pause between consecutive container starts
    pub settle_delay: Duration,
    /// Upper bound on one init container run
    pub init_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Config::default().settings()
    }
}
