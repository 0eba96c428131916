//! Client connection representation.
//!
//! Tracks the metadata of one open connection and the queue feeding its
//! outgoing task. The reader half is owned by the connection's handler task
//! and the write half by its outgoing task.

use crate::player::PlayerId;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Notify};

/// Type-erased write half so handlers can be driven by any byte sink.
pub type ConnectionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One queued line plus the receipt resolved once it is written or dropped.
#[derive(Debug)]
pub struct Outgoing {
    pub line: String,
    pub delivered: oneshot::Sender<bool>,
}

/// Why a line could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The connection is already being closed
    Closing,
    /// The outgoing queue is full
    Full,
}

/// Close request shared by a connection's reader loop, its outgoing task and
/// the manager.
#[derive(Debug, Default)]
pub struct CloseSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    /// Requests the close. Only the first call wakes the reader; the permit
    /// is stored, so a reader busy elsewhere still sees it on its next wait.
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once a close has been requested.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Represents an individual client connection to the server.
pub struct ClientConnection {
    /// The player id assigned to this connection by the acceptor
    pub player_id: PlayerId,

    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,

    outbox: mpsc::Sender<Outgoing>,
    close: Arc<CloseSignal>,
}

impl ClientConnection {
    pub fn new(
        player_id: PlayerId,
        remote_addr: SocketAddr,
        outbox: mpsc::Sender<Outgoing>,
    ) -> Self {
        Self {
            player_id,
            remote_addr,
            connected_at: SystemTime::now(),
            outbox,
            close: Arc::new(CloseSignal::default()),
        }
    }

    /// Signal the connection's reader loop waits on to stop early.
    pub fn close_signal(&self) -> Arc<CloseSignal> {
        Arc::clone(&self.close)
    }

    pub fn request_close(&self) {
        self.close.request();
    }

    pub fn is_closing(&self) -> bool {
        self.close.is_requested()
    }

    /// Queues `line` for the outgoing task without waiting. The returned
    /// receipt resolves to true once the line has been written.
    pub fn queue(&self, line: &str) -> Result<oneshot::Receiver<bool>, QueueError> {
        if self.is_closing() {
            return Err(QueueError::Closing);
        }
        let (delivered, receipt) = oneshot::channel();
        let outgoing = Outgoing {
            line: line.to_owned(),
            delivered,
        };
        match self.outbox.try_send(outgoing) {
            Ok(()) => Ok(receipt),
            Err(TrySendError::Full(_)) => Err(QueueError::Full),
            Err(TrySendError::Closed(_)) => Err(QueueError::Closing),
        }
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("player_id", &self.player_id)
            .field("remote_addr", &self.remote_addr)
            .field("connected_at", &self.connected_at)
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}
