//! Shared state handed to the acceptor, the connection handlers and the
//! dispatcher.
//!
//! The registries are constructed once per server and live exactly as long
//! as the [`LobbyContext`] holding them.

use crate::config::ServerConfig;
use crate::connection::ConnectionManager;
use crate::player::PlayerRegistry;
use crate::session::{SessionRegistry, SessionTimings};
use crate::status::StatusSnapshot;
use std::time::Instant;

#[derive(Debug)]
pub struct LobbyContext {
    pub config: ServerConfig,
    pub players: PlayerRegistry,
    pub sessions: SessionRegistry,
    pub connections: ConnectionManager,
    started_at: Instant,
}

impl LobbyContext {
    pub fn new(config: ServerConfig) -> Self {
        let sessions = SessionRegistry::new(SessionTimings {
            start_delay: config.start_delay(),
            finished_grace: config.finished_grace(),
        });
        let connections = ConnectionManager::new(config.send_timeout());
        Self {
            config,
            players: PlayerRegistry::new(),
            sessions,
            connections,
            started_at: Instant::now(),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot::collect(self, self.started_at.elapsed())
    }
}
