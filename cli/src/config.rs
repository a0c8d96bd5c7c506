//! Configuration file management
//!
//! `CLIConfiguration` with TOML parsing for `~/.atlas/config.toml`.
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! url = "https://sync.example.com"
//! transport = "auto"             # message, degraded, auto
//!
//! [connection]
//! auto_reconnect = true
//! reconnect_delay_ms = 1000      # Initial reconnect delay, doubles per attempt
//! max_reconnect_delay_ms = 30000
//! max_reconnect_attempts = 5     # 0 disables automatic reconnection
//! heartbeat_interval_ms = 30000  # 0 disables heartbeats
//! connection_timeout_secs = 10
//! auth_timeout_secs = 5
//! send_timeout_secs = 10
//!
//! [auth]
//! token = "your-token"           # ATLAS_TOKEN / --token take precedence
//!
//! [logging]
//! level = "info"
//! format = "compact"             # compact, json
//! file = "/var/log/atlas-tail.log"
//!
//! [[regions]]
//! north = 10.0
//! south = 0.0
//! east = 10.0
//! west = 0.0
//! ```

use atlas_link::{ConnectionOptions, LinkTimeouts, RegionBounds, TransportPreference};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CLIError, Result};

const DEFAULT_CONFIG_PATH: &str = "~/.atlas/config.toml";

/// CLI configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CLIConfiguration {
    /// Server endpoint settings
    pub server: Option<ServerConfig>,

    /// Connection/reconnection settings
    pub connection: Option<ConnectionConfig>,

    /// Authentication settings
    pub auth: Option<AuthConfig>,

    /// Log output settings
    pub logging: Option<LoggingConfig>,

    /// Regions subscribed on startup
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server URL (e.g., https://sync.example.com)
    pub url: Option<String>,

    /// Transport preference: "message", "degraded", "auto" (default: "auto")
    #[serde(default = "default_transport")]
    pub transport: String,
}

/// Connection settings for reconnection behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Enable automatic reconnection on connection loss (default: true)
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Initial delay between reconnection attempts in milliseconds (default: 1000)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum delay between reconnection attempts in milliseconds (default: 30000)
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of reconnection attempts (0 disables, default: 5)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Heartbeat interval in milliseconds (0 disables, default: 30000)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,

    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level or a full EnvFilter directive (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "compact" or "json" (default: "compact")
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Append logs to this file instead of stderr
    pub file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl From<RegionConfig> for RegionBounds {
    fn from(r: RegionConfig) -> Self {
        RegionBounds::new(r.north, r.south, r.east, r.west)
    }
}

fn default_transport() -> String {
    "auto".to_string()
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval_ms() -> u64 {
    30000
}

fn default_connection_timeout_secs() -> u64 {
    10
}

fn default_auth_timeout_secs() -> u64 {
    5
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: Some("http://localhost:8080".to_string()),
            transport: default_transport(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            connection_timeout_secs: default_connection_timeout_secs(),
            auth_timeout_secs: default_auth_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Default for CLIConfiguration {
    fn default() -> Self {
        Self {
            server: Some(ServerConfig::default()),
            connection: Some(ConnectionConfig::default()),
            auth: None,
            logging: Some(LoggingConfig::default()),
            regions: Vec::new(),
        }
    }
}

pub fn expand_config_path(path: &Path) -> PathBuf {
    let path_str = path.to_str().unwrap_or(DEFAULT_CONFIG_PATH);
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    }
    path.to_path_buf()
}

pub fn default_config_path() -> PathBuf {
    expand_config_path(Path::new(DEFAULT_CONFIG_PATH))
}

pub fn parse_transport(value: &str) -> Result<TransportPreference> {
    match value.trim().to_lowercase().as_str() {
        "message" | "binary" => Ok(TransportPreference::Message),
        "degraded" | "text" => Ok(TransportPreference::Degraded),
        "auto" => Ok(TransportPreference::Auto),
        other => Err(CLIError::ConfigurationError(format!(
            "Unknown transport '{}'; expected message, degraded or auto",
            other
        ))),
    }
}

impl CLIConfiguration {
    /// Load configuration from file
    ///
    /// Returns default configuration if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CLIError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;

        let config: CLIConfiguration = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| CLIError::ConfigurationError(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Build ConnectionOptions from the `[server]` and `[connection]` tables.
    pub fn to_connection_options(&self) -> Result<ConnectionOptions> {
        let server = self.resolved_server();
        let conn = self.resolved_connection();

        Ok(ConnectionOptions::default()
            .with_transport(parse_transport(&server.transport)?)
            .with_auto_reconnect(conn.auto_reconnect)
            .with_reconnect_delay_ms(conn.reconnect_delay_ms)
            .with_max_reconnect_delay_ms(conn.max_reconnect_delay_ms)
            .with_max_reconnect_attempts(conn.max_reconnect_attempts)
            .with_heartbeat_interval_ms(conn.heartbeat_interval_ms))
    }

    pub fn to_timeouts(&self) -> LinkTimeouts {
        let conn = self.resolved_connection();
        LinkTimeouts::builder()
            .connection_timeout_secs(conn.connection_timeout_secs)
            .auth_timeout_secs(conn.auth_timeout_secs)
            .send_timeout_secs(conn.send_timeout_secs)
            .build()
    }

    /// Validated startup regions.
    pub fn region_bounds(&self) -> Result<Vec<RegionBounds>> {
        self.regions
            .iter()
            .map(|r| {
                let bounds = RegionBounds::from(*r);
                bounds.validate()?;
                Ok(bounds)
            })
            .collect()
    }

    pub fn resolved_server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn resolved_connection(&self) -> ConnectionConfig {
        self.connection.clone().unwrap_or_default()
    }

    pub fn resolved_logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    pub fn token(&self) -> Option<String> {
        self.auth.as_ref().and_then(|a| a.token.clone()).filter(|t| !t.trim().is_empty())
    }
}
