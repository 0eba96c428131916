//! Read-only status snapshots for reporters and the `status` command.

use crate::context::LobbyContext;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub server_name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub ready_players: usize,
    pub players_by_state: BTreeMap<String, usize>,
    pub sessions_by_state: BTreeMap<String, usize>,
    pub uptime_secs: u64,
}

impl StatusSnapshot {
    pub(crate) fn collect(context: &LobbyContext, uptime: Duration) -> Self {
        let players = context.players.list();
        let sessions = context.sessions.list();

        let mut players_by_state = BTreeMap::new();
        for player in &players {
            *players_by_state
                .entry(format!("{:?}", player.state))
                .or_insert(0) += 1;
        }

        let mut sessions_by_state = BTreeMap::new();
        for session in &sessions {
            *sessions_by_state
                .entry(format!("{:?}", session.state))
                .or_insert(0) += 1;
        }

        Self {
            server_name: context.config.server_name.clone(),
            player_count: players.len(),
            max_players: context.config.max_players,
            active_sessions: sessions.iter().filter(|s| s.state.is_active()).count(),
            total_sessions: sessions.len(),
            ready_players: players.iter().filter(|p| p.ready).count(),
            players_by_state,
            sessions_by_state,
            uptime_secs: uptime.as_secs(),
        }
    }

    /// One-line summary sent in reply to the `status` command.
    pub fn summary_line(&self) -> String {
        format!(
            "Server: {} | Players: {}/{} | Active sessions: {}",
            self.server_name, self.player_count, self.max_players, self.active_sessions
        )
    }
}
