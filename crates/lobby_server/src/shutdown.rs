//! Shutdown coordination for the lobby server.
//!
//! A single cooperative signal shared by the acceptor and the application.
//! Waiters that subscribe after shutdown was initiated still observe it.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared shutdown state for coordinating shutdown across components.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    initiated: Arc<watch::Sender<bool>>,
}

impl ShutdownState {
    /// Creates a new shutdown state that has not been triggered.
    pub fn new() -> Self {
        let (initiated, _) = watch::channel(false);
        Self {
            initiated: Arc::new(initiated),
        }
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.initiated.borrow()
    }

    /// Initiates shutdown and wakes every task waiting on [`Self::wait`].
    pub fn initiate_shutdown(&self) {
        if !self.initiated.send_replace(true) {
            info!("🛑 Shutdown initiated - no new connections will be accepted");
        }
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait(&self) {
        let mut receiver = self.initiated.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|initiated| *initiated).await;
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_initiation() {
        let state = ShutdownState::new();
        assert!(!state.is_shutdown_initiated());

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait().await })
        };

        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
        assert!(state.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn late_waiters_see_earlier_initiation() {
        let state = ShutdownState::new();
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.wait())
            .await
            .expect("already-initiated shutdown should resolve immediately");
    }
}
