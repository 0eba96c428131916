//! Cancellable per-session timers.
//!
//! At most one timer is pending per session. Scheduling a new one aborts the
//! previous timer for that session, and a timer that fires only unregisters
//! its own generation.
//!
//! Timers run on the Tokio runtime current at the call site, or else on the
//! runtime that was current when the timer set was created. That lets
//! synchronous callers on plain threads schedule transitions too.

use super::SessionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{trace, warn};

#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Debug)]
pub struct SessionTimers {
    pending: DashMap<SessionId, PendingTimer>,
    next_generation: AtomicU64,
    /// Runtime captured at construction, if there was one
    runtime: Option<Handle>,
}

impl Default for SessionTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTimers {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_generation: AtomicU64::new(0),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Runs `task` after `delay` unless cancelled or replaced first.
    ///
    /// Returns false, leaving any previous timer in place, when no Tokio
    /// runtime is reachable.
    pub fn schedule<F>(
        self: &Arc<Self>,
        session_id: SessionId,
        delay: Duration,
        task: F,
    ) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(runtime) = Handle::try_current().ok().or_else(|| self.runtime.clone()) else {
            warn!(
                "⏱️ No async runtime available, timer for session {} not scheduled",
                session_id
            );
            return false;
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(self);

        // The entry guard is held until the new timer is registered so a
        // zero-delay timer cannot unregister itself before it exists.
        let slot = self.pending.entry(session_id);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            timers
                .pending
                .remove_if(&session_id, |_, pending| pending.generation == generation);
            task.await;
        })
        .abort_handle();

        let replaced = match slot {
            Entry::Occupied(mut existing) => {
                Some(existing.insert(PendingTimer { generation, handle }))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingTimer { generation, handle });
                None
            }
        };

        if let Some(previous) = replaced {
            previous.handle.abort();
            trace!("⏱️ Replaced pending timer for session {}", session_id);
        }
        true
    }

    /// Aborts the pending timer for `session_id`. Returns whether one existed.
    pub fn cancel(&self, session_id: SessionId) -> bool {
        match self.pending.remove(&session_id) {
            Some((_, pending)) => {
                pending.handle.abort();
                trace!("⏱️ Cancelled pending timer for session {}", session_id);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, session_id: SessionId) -> bool {
        self.pending.contains_key(&session_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
