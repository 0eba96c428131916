//! Ad-hoc game sessions and their lifecycle.
//!
//! Sessions move `Waiting → Starting → InProgress → Finished`. The
//! `Starting → InProgress` step and the removal of a finished session are
//! driven by timers owned by [`SessionTimers`], so ending or removing a
//! session always cancels whatever was still pending for it.
//!
//! `Paused` is part of the state model but no operation in this crate
//! enters or leaves it.

pub mod registry;
pub mod timers;

pub use registry::{SessionRegistry, SessionTimings};
pub use timers::SessionTimers;

use crate::player::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

/// Opaque session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Waiting,
    Starting,
    InProgress,
    /// Reserved; never entered by the registry's own transitions.
    Paused,
    Finished,
}

impl SessionState {
    /// Waiting, Starting and InProgress sessions count as active.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Waiting | SessionState::Starting | SessionState::InProgress
        )
    }

    /// States that `stop_all` brings to an end.
    pub fn is_running(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::InProgress)
    }
}

/// Membership entry. Only the id is known when the member is added; the
/// display name is filled in from the player registry afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMember {
    pub player_id: PlayerId,
    pub display_name: Option<String>,
    pub joined_at: SystemTime,
}

impl SessionMember {
    pub fn placeholder(player_id: PlayerId) -> Self {
        Self {
            player_id,
            display_name: None,
            joined_at: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub game_mode: String,
    pub members: Vec<SessionMember>,
    pub state: SessionState,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub ended_at: Option<SystemTime>,
    pub settings: HashMap<String, String>,
}

impl Session {
    fn new(game_mode: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            game_mode: game_mode.into(),
            members: Vec::new(),
            state: SessionState::Waiting,
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
            settings: HashMap::new(),
        }
    }

    pub fn has_member(&self, player_id: PlayerId) -> bool {
        self.members.iter().any(|m| m.player_id == player_id)
    }

    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.player_id).collect()
    }

    /// Appends a placeholder member unless the id is already present.
    fn push_member(&mut self, player_id: PlayerId) -> bool {
        if self.has_member(player_id) {
            return false;
        }
        self.members.push(SessionMember::placeholder(player_id));
        true
    }
}
