//! Configuration management for the alpha shortlist services.
//!
//! All services share a configuration file at `~/.alpha-shortlist/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (ALPHA_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `ALPHA_LOG_LEVEL` → observability.log_level
//! - `ALPHA_LOG_FORMAT` → observability.log_format
//! - `ALPHA_API_KEY` → market_data.api_key
//! - `ALPHA_API_BASE_URL` → market_data.base_url
//! - `ALPHA_DATA_DIR` → storage.data_dir

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".alpha-shortlist"),
        |dirs| dirs.home_dir().join(".alpha-shortlist"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration shared by every service in the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Upstream market data API settings
    #[serde(default)]
    pub market_data: MarketDataConfig,

    /// Snapshot and tracker persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Screener pipeline settings.
    ///
    /// Kept opaque here; the screener crate decodes it into its own typed
    /// configuration so policy knobs can evolve without touching this crate.
    #[serde(default)]
    pub screener: Option<serde_json::Value>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (explicit path or default) with environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("ALPHA_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("ALPHA_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(key) = std::env::var("ALPHA_API_KEY") {
            self.market_data.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("ALPHA_API_BASE_URL") {
            self.market_data.base_url = url;
        }
        if let Ok(dir) = std::env::var("ALPHA_DATA_DIR") {
            self.storage.data_dir = Some(dir);
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to pin at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Market Data
// ============================================================================

/// Upstream market data API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Prefer the `ALPHA_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Proactive rate limit (requests per minute)
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// TTL for cached responses in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            rate_limit_rpm: default_rate_limit_rpm(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Persistence configuration for snapshots and tracker state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Defaults to `<config_dir>/data`.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Tracker backend ("json" or "sqlite")
    #[serde(default = "default_tracker_backend")]
    pub tracker_backend: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            tracker_backend: default_tracker_backend(),
        }
    }
}

impl StorageConfig {
    /// Resolve the data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir().join("data"))
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_base_url() -> String {
    "https://api.polygon.io".into()
}
fn default_rate_limit_rpm() -> u32 {
    300
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_cache_ttl_secs() -> i64 {
    60
}
fn default_tracker_backend() -> String {
    "json".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.log_format, "pretty");
        assert_eq!(config.market_data.rate_limit_rpm, 300);
        assert_eq!(config.storage.tracker_backend, "json");
        assert!(config.screener.is_none());
    }

    #[test]
    fn test_legacy_aliases() {
        let config: Config =
            serde_json::from_str(r#"{"observability": {"level": "debug", "format": "json"}}"#)
                .unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_from_file_keeps_screener_block_opaque() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{"storage": {"data_dir": "/tmp/alpha"}, "screener": {"universe": {"heavy_top_k": 40}}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage.data_dir(), PathBuf::from("/tmp/alpha"));
        let screener = config.screener.unwrap();
        assert_eq!(screener["universe"]["heavy_top_k"], 40);
    }

    #[test]
    fn test_load_from_reports_bad_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
