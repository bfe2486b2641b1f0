//! Configuration system for the Rhizome daemon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RHIZOME_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/rhizome/config.toml
//!   3. ~/.config/rhizome/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RhizomeConfig {
    pub store: StoreConfig,
    pub link: LinkConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory containing `blob/`, `hash/`, and the sqlite database.
    pub path: PathBuf,
    /// Hard cap on total store size in bytes. 0 = unlimited.
    pub database_size: u64,
    /// Filesystem free-space floor in bytes. 0 = not consulted.
    pub min_free_space: u64,
    /// Payloads at or under this size are stored as database blobs;
    /// larger payloads are stored as external files.
    pub blob_threshold: u64,
    /// Cap on the writer's out-of-order buffering, in bytes.
    pub write_buffer_max: usize,
    /// Read cache entry expiry, in milliseconds.
    pub read_cache_expiry_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Path to the serial device, or a `sim://left` / `sim://right`
    /// pseudo-path to attach to the in-process radio simulator.
    pub device: String,
    /// Heartbeat emission interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Per-bit error rate used only when `device` is a simulator endpoint,
    /// expressed as `ber / 2^32`.
    pub simulated_ber: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Loopback port the HTTP surface binds to. 0 = OS-assigned.
    pub port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for RhizomeConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            link: LinkConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("rhizome"),
            database_size: 1_073_741_824, // 1 GiB
            min_free_space: 0,
            blob_threshold: 131_072, // 128 KiB
            write_buffer_max: 1_048_576, // 1 MiB
            read_cache_expiry_ms: 5_000,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            heartbeat_interval_ms: 1_000,
            simulated_ber: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 4110 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("rhizome")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"))
        .join("rhizome")
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

impl RhizomeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RhizomeConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn file_path() -> PathBuf {
        std::env::var("RHIZOME_CONFIG")
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
            let text = toml::to_string_pretty(&RhizomeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RHIZOME_STORE__PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RHIZOME_STORE__DATABASE_SIZE") {
            if let Ok(n) = v.parse() {
                self.store.database_size = n;
            }
        }
        if let Ok(v) = std::env::var("RHIZOME_STORE__MIN_FREE_SPACE") {
            if let Ok(n) = v.parse() {
                self.store.min_free_space = n;
            }
        }
        if let Ok(v) = std::env::var("RHIZOME_LINK__DEVICE") {
            self.link.device = v;
        }
        if let Ok(v) = std::env::var("RHIZOME_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
    }
}
