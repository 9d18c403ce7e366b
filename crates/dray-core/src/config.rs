//! Configuration system for dray.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $DRAY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/dray/config.toml
//!   3. ~/.config/dray/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrayConfig {
    pub network: NetworkConfig,
    pub executor: ExecutorSettings,
    pub workloads: WorkloadsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the RPC listener binds.
    pub listen_addr: String,
    /// TCP port for framed RPC traffic.
    pub port: u16,
    /// Port for the local HTTP status endpoint.
    pub api_port: u16,
    /// Largest accepted frame payload in bytes. 0 = protocol default (2 MiB).
    pub max_frame_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Working directory handed to workloads that touch the filesystem.
    pub work_dir: PathBuf,
    /// Max concurrently running sub-tasks. 0 = num_cpus.
    pub max_concurrent_tasks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadsConfig {
    /// Enable/disable per built-in workload.
    pub echo: bool,
    pub shell: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DrayConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            executor: ExecutorSettings::default(),
            workloads: WorkloadsConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 9567,
            api_port: 9568,
            max_frame_bytes: 0,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/dray-work"),
            max_concurrent_tasks: 0,
        }
    }
}

impl Default for WorkloadsConfig {
    fn default() -> Self {
        Self {
            echo: true,
            shell: false,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("dray")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DrayConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            DrayConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DRAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&DrayConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// The effective max frame payload, applying the protocol default.
    pub fn max_frame_bytes(&self) -> usize {
        if self.network.max_frame_bytes == 0 {
            crate::wire::MAX_PAYLOAD
        } else {
            self.network.max_frame_bytes as usize
        }
    }

    /// Apply DRAY_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DRAY_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Ok(v) = std::env::var("DRAY_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Ok(v) = std::env::var("DRAY_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Ok(v) = std::env::var("DRAY_EXECUTOR__MAX_CONCURRENT_TASKS") {
            if let Ok(n) = v.parse() {
                self.executor.max_concurrent_tasks = n;
            }
        }
        if let Ok(v) = std::env::var("DRAY_WORKLOADS__ECHO") {
            self.workloads.echo = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("DRAY_WORKLOADS__SHELL") {
            self.workloads.shell = v == "true" || v == "1";
        }
    }
}
