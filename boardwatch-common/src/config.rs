//! Configuration types and persistence for boardwatch services.
//!
//! Configuration lives at `~/.boardwatch/config.json` next to the other
//! persisted documents (watchlist, market pools, analysis cache). Runtime
//! toggles edited through the HTTP surface are written back to the same
//! file so they survive restarts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the data directory path.
///
/// Honors `BOARDWATCH_DATA_DIR` for tests and alternate deployments,
/// falling back to `~/.boardwatch`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BOARDWATCH_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir().map_or_else(
        || PathBuf::from(".boardwatch"),
        |home| home.join(".boardwatch"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "127.0.0.1" (local only).
    /// Set to "0.0.0.0" for remote access.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

// ============================================================================
// Monitor Configuration
// ============================================================================

/// Runtime toggles for the monitoring loops.
///
/// These are editable through the config endpoint and persisted on change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Whether the background analysis scheduler runs at all
    #[serde(default = "default_true")]
    pub auto_analysis_enabled: bool,

    /// Use the adaptive window table. When false, `fixed_interval_minutes`
    /// applies around the clock (blackouts still hold).
    #[serde(default = "default_true")]
    pub use_smart_schedule: bool,

    /// Fixed scan interval when smart scheduling is off
    #[serde(default = "default_fixed_interval")]
    pub fixed_interval_minutes: u64,

    /// Per-request timeout for quote vendors, in seconds
    #[serde(default = "default_vendor_timeout")]
    pub vendor_timeout_secs: u64,

    /// Base URL of the external candidate annotator. `None` disables the
    /// annotation arm of analysis runs.
    #[serde(default)]
    pub annotator_url: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            auto_analysis_enabled: true,
            use_smart_schedule: true,
            fixed_interval_minutes: default_fixed_interval(),
            vendor_timeout_secs: default_vendor_timeout(),
            annotator_url: None,
        }
    }
}

fn default_fixed_interval() -> u64 {
    15
}

fn default_vendor_timeout() -> u64 {
    10
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Monitoring loop toggles
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable fallbacks.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("BOARDWATCH_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("BOARDWATCH_HOST") {
            self.server.host = host;
        }
        if let Ok(level) = std::env::var("BOARDWATCH_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let path = config_path();
        let dir = data_dir();

        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Get the effective bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
