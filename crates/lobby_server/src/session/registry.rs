//! Concurrent session registry and lifecycle state machine.
//!
//! Every composite edit ("add if absent", "remove then end if empty",
//! "start if waiting") runs under a single `DashMap` entry guard. Timers are
//! scheduled only after the guard is released, and each timer re-checks the
//! session state before acting.

use super::{Session, SessionId, SessionState, SessionTimers};
use crate::player::{PlayerId, PlayerRegistry};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Delays driving the automatic lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Time spent in `Starting` before moving to `InProgress`
    pub start_delay: Duration,
    /// Time a `Finished` session stays queryable before removal
    pub finished_grace: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(1),
            finished_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Session>>,
    timers: Arc<SessionTimers>,
    timings: SessionTimings,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionTimings::default())
    }
}

impl SessionRegistry {
    pub fn new(timings: SessionTimings) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            timers: Arc::new(SessionTimers::new()),
            timings,
        }
    }

    pub fn timings(&self) -> SessionTimings {
        self.timings
    }

    /// Creates a `Waiting` session with placeholder members. Duplicate ids
    /// in `member_ids` are collapsed.
    pub fn create(&self, game_mode: &str, member_ids: &[PlayerId]) -> SessionId {
        let mut session = Session::new(game_mode);
        for &player_id in member_ids {
            session.push_member(player_id);
        }
        let id = session.id;
        info!(
            "🎲 Created session {} ({}) with {} member(s)",
            id,
            game_mode,
            session.members.len()
        );
        self.sessions.insert(id, session);
        id
    }

    pub fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.get(&session_id).map(|s| s.value().clone())
    }

    pub fn list(&self) -> Vec<Session> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Sessions in `Waiting`, `Starting` or `InProgress`. Finished sessions
    /// are excluded even while they are still inside their grace period.
    pub fn active_sessions(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|s| s.state.is_active())
            .map(|s| s.value().clone())
            .collect()
    }

    /// Moves a `Waiting` session to `Starting` and schedules the move to
    /// `InProgress`. Returns false if the session is unknown or not waiting.
    ///
    /// May be called from any thread. The delayed step runs on the Tokio
    /// runtime current here or at construction; with neither, a warning is
    /// logged and the session stays `Starting`.
    pub fn start(&self, session_id: SessionId) -> bool {
        {
            let Some(mut session) = self.sessions.get_mut(&session_id) else {
                warn!("Cannot start unknown session {}", session_id);
                return false;
            };
            if session.state != SessionState::Waiting {
                debug!(
                    "Session {} not started: state is {:?}",
                    session_id, session.state
                );
                return false;
            }
            session.state = SessionState::Starting;
            session.started_at = Some(SystemTime::now());
        }

        info!("🚦 Session {} starting", session_id);
        let registry = self.clone();
        self.timers
            .schedule(session_id, self.timings.start_delay, async move {
                registry.complete_start(session_id);
            });
        true
    }

    fn complete_start(&self, session_id: SessionId) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            if session.state == SessionState::Starting {
                session.state = SessionState::InProgress;
                info!("▶️ Session {} in progress", session_id);
            }
        }
    }

    /// Finishes a session and schedules its removal after the grace period,
    /// cancelling any transition still pending for it.
    ///
    /// Returns false if the session is unknown or already finished.
    pub fn end(&self, session_id: SessionId) -> bool {
        {
            let Some(mut session) = self.sessions.get_mut(&session_id) else {
                warn!("Cannot end unknown session {}", session_id);
                return false;
            };
            if !Self::finish(&mut session) {
                return false;
            }
        }
        self.schedule_removal(session_id);
        true
    }

    /// Marks a session finished. Returns false if it already was.
    fn finish(session: &mut Session) -> bool {
        if session.state == SessionState::Finished {
            return false;
        }
        session.state = SessionState::Finished;
        session.ended_at = Some(SystemTime::now());
        info!("🏁 Session {} finished", session.id);
        true
    }

    fn schedule_removal(&self, session_id: SessionId) {
        let sessions = Arc::clone(&self.sessions);
        // Replaces (and thereby cancels) a pending start transition.
        self.timers
            .schedule(session_id, self.timings.finished_grace, async move {
                let removed = sessions
                    .remove_if(&session_id, |_, session| {
                        session.state == SessionState::Finished
                    })
                    .is_some();
                if removed {
                    debug!("🧹 Removed finished session {}", session_id);
                }
            });
    }

    /// Removes a session immediately and cancels its pending timer.
    pub fn remove(&self, session_id: SessionId) -> Option<Session> {
        self.timers.cancel(session_id);
        self.sessions.remove(&session_id).map(|(_, session)| session)
    }

    /// Adds a placeholder member. Returns false if the session is unknown or
    /// the player is already a member.
    pub fn add_member(&self, session_id: SessionId, player_id: PlayerId) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(mut session) => session.push_member(player_id),
            None => {
                warn!(
                    "Cannot add player {} to unknown session {}",
                    player_id, session_id
                );
                false
            }
        }
    }

    /// Removes a member. If that leaves the session empty, the session is
    /// ended in the same step.
    pub fn remove_member(&self, session_id: SessionId, player_id: PlayerId) -> bool {
        let emptied = {
            let Some(mut session) = self.sessions.get_mut(&session_id) else {
                warn!(
                    "Cannot remove player {} from unknown session {}",
                    player_id, session_id
                );
                return false;
            };
            let before = session.members.len();
            session.members.retain(|m| m.player_id != player_id);
            if session.members.len() == before {
                return false;
            }
            session.members.is_empty() && Self::finish(&mut session)
        };

        if emptied {
            info!("Session {} has no members left, ending it", session_id);
            self.schedule_removal(session_id);
        }
        true
    }

    /// Removes `player_id` from every active session it belongs to and
    /// returns the ids of the sessions it was removed from.
    pub fn remove_from_active(&self, player_id: PlayerId) -> Vec<SessionId> {
        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.state.is_active() && s.has_member(player_id))
            .map(|s| *s.key())
            .collect();

        candidates
            .into_iter()
            .filter(|&session_id| self.remove_member(session_id, player_id))
            .collect()
    }

    /// Ends every `Starting` or `InProgress` session, one after another, and
    /// returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let running: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.state.is_running())
            .map(|s| *s.key())
            .collect();

        let stopped = running.into_iter().filter(|&id| self.end(id)).count();
        if stopped > 0 {
            info!("⏹️ Stopped {} running session(s)", stopped);
        }
        stopped
    }

    /// Stores an opaque setting on the session.
    pub fn set_setting(&self, session_id: SessionId, key: &str, value: &str) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(mut session) => {
                session.settings.insert(key.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    /// Copies current display names from the player registry into the
    /// session's member records. Members that are no longer registered keep
    /// whatever name they had.
    pub fn sync_member_names(&self, session_id: SessionId, players: &PlayerRegistry) -> bool {
        let Some(mut session) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        for member in session.members.iter_mut() {
            if let Some(name) = players.display_name(member.player_id) {
                member.display_name = Some(name);
            }
        }
        true
    }

    pub fn has_pending_timer(&self, session_id: SessionId) -> bool {
        self.timers.is_pending(session_id)
    }
}
