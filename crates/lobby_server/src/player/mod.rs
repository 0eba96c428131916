//! Connected player records and the registry that owns them.
//!
//! A player exists in the registry exactly as long as its connection is
//! open: it is created by the dispatcher when the acceptor reports a new
//! connection and removed when the connection handler reports the
//! disconnect.

pub mod registry;

pub use registry::PlayerRegistry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

/// Identifier assigned to a connection by the acceptor's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PlayerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerState {
    Connected,
    InLobby,
    InGame,
    Spectating,
    Disconnected,
}

/// A connected player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub remote_addr: SocketAddr,
    pub connected_at: SystemTime,
    pub ready: bool,
    pub team_id: u32,
    pub color_id: u32,
    pub state: PlayerState,
}

impl Player {
    /// Creates a freshly connected player with a generated display name.
    pub fn new(id: PlayerId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            display_name: default_display_name(id),
            remote_addr,
            connected_at: SystemTime::now(),
            ready: false,
            team_id: 0,
            color_id: 0,
            state: PlayerState::Connected,
        }
    }
}

/// Name used for a player that never chose one, or whose record is gone.
pub fn default_display_name(id: PlayerId) -> String {
    format!("Player{id}")
}
