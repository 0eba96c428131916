//! Configuration management for the lobby server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use lobby_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Log levels accepted by `[logging] level`.
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration loaded from TOML file.
///
/// Sections missing from the file fall back to their defaults, so a file
/// containing only `[server]` is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server identity, binding and capacity
    pub server: ServerSettings,
    /// Session lifecycle timings
    #[serde(default)]
    pub sessions: SessionSettings,
    /// Per-connection I/O limits
    #[serde(default)]
    pub network: NetworkSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:7777")
    pub bind_address: String,
    /// Display name used in welcome and status messages
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Maximum number of players reported in status output
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Reject connections beyond `max_players`
    #[serde(default)]
    pub enforce_max_players: bool,
    /// Interval between status reports in seconds (0 to disable)
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

/// Session lifecycle timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Delay before a starting session is in progress, in milliseconds
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    /// How long finished sessions stay queryable, in seconds
    #[serde(default = "default_finished_grace_secs")]
    pub finished_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Upper bound on a single outbound write, in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Size of each connection's read buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,
    /// Longest accepted command line in bytes
    #[serde(default = "default_buffer_size")]
    pub max_line_length: usize,
    /// Capacity of the notification queue feeding the dispatcher
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

fn default_server_name() -> String {
    ServerConfig::default().server_name
}

fn default_max_players() -> usize {
    ServerConfig::default().max_players
}

fn default_status_interval() -> u64 {
    60
}

fn default_start_delay_ms() -> u64 {
    ServerConfig::default().start_delay_ms
}

fn default_finished_grace_secs() -> u64 {
    ServerConfig::default().finished_grace_secs
}

fn default_send_timeout_ms() -> u64 {
    ServerConfig::default().send_timeout_ms
}

fn default_buffer_size() -> usize {
    4096
}

fn default_event_queue_capacity() -> usize {
    ServerConfig::default().event_queue_capacity
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: ServerConfig::default().bind_address.to_string(),
            name: default_server_name(),
            max_players: default_max_players(),
            enforce_max_players: false,
            status_interval_secs: default_status_interval(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            start_delay_ms: default_start_delay_ms(),
            finished_grace_secs: default_finished_grace_secs(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            read_buffer_size: default_buffer_size(),
            max_line_length: default_buffer_size(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            sessions: SessionSettings::default(),
            network: NetworkSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to the lobby server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            server_name: self.server.name.clone(),
            max_players: self.server.max_players,
            enforce_max_players: self.server.enforce_max_players,
            start_delay_ms: self.sessions.start_delay_ms,
            finished_grace_secs: self.sessions.finished_grace_secs,
            send_timeout_ms: self.network.send_timeout_ms,
            read_buffer_size: self.network.read_buffer_size,
            max_line_length: self.network.max_line_length,
            event_queue_capacity: self.network.event_queue_capacity,
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.name.trim().is_empty() {
            return Err("Server name cannot be empty".to_string());
        }

        if self.server.max_players == 0 {
            return Err("server.max_players must be greater than 0".to_string());
        }

        if self.network.read_buffer_size == 0 {
            return Err("network.read_buffer_size must be greater than 0".to_string());
        }

        if self.network.max_line_length == 0 {
            return Err("network.max_line_length must be at least 1".to_string());
        }

        if self.network.event_queue_capacity == 0 {
            return Err("network.event_queue_capacity must be greater than 0".to_string());
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
