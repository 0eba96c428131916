//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the lobby server behavior.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for the lobby server.
///
/// Contains the network settings, the advertised server identity, capacity
/// reporting, session lifecycle timings and per-connection I/O limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Display name reported by the `status` command and welcome message
    pub server_name: String,

    /// Maximum number of players reported in status output
    pub max_players: usize,

    /// Reject connections beyond `max_players` instead of only reporting them
    pub enforce_max_players: bool,

    /// Delay between `Starting` and `InProgress` in milliseconds
    pub start_delay_ms: u64,

    /// How long a finished session stays queryable, in seconds
    pub finished_grace_secs: u64,

    /// Upper bound on a single outbound write in milliseconds
    pub send_timeout_ms: u64,

    /// Size of the fixed read buffer used by each connection
    pub read_buffer_size: usize,

    /// Longest accepted command line in bytes
    pub max_line_length: usize,

    /// Capacity of the bounded notification channel
    pub event_queue_capacity: usize,
}

impl ServerConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn finished_grace(&self) -> Duration {
        Duration::from_secs(self.finished_grace_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 7777)),
            server_name: "Lobby Server".to_string(),
            max_players: 16,
            enforce_max_players: false,
            start_delay_ms: 1_000,
            finished_grace_secs: 30,
            send_timeout_ms: 5_000,
            read_buffer_size: 4096,
            max_line_length: 4096,
            event_queue_capacity: 1024,
        }
    }
}
