//! Connection manager for tracking and writing to client connections.
//!
//! This module provides the central registry of open connections, keyed by
//! player id, plus unicast and broadcast delivery of text lines.
//!
//! Every connection owns an outgoing task that drains a bounded queue into
//! the socket. Sending only enqueues, so callers never wait on a peer, and
//! lines for one connection are written in the order they were queued. A
//! write that fails or times out closes and unregisters that connection
//! alone; its reader loop then tears it down and reports the disconnect.

use super::client::{ClientConnection, CloseSignal, ConnectionWriter, Outgoing, QueueError};
use crate::player::PlayerId;
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Lines a connection may have queued before it is dropped as too slow.
pub const OUTBOX_CAPACITY: usize = 256;

type ConnectionMap = DashMap<PlayerId, Arc<ClientConnection>>;

/// Central manager for all client connections.
///
/// Lookups clone the connection's `Arc` and release the map guard straight
/// away; nothing here holds a shard lock across an await.
#[derive(Debug)]
pub struct ConnectionManager {
    connections: Arc<ConnectionMap>,

    /// Upper bound on a single write, so a stalled peer is detected and
    /// dropped instead of holding its queue forever
    send_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            send_timeout,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Registers the write half of a new connection, spawns its outgoing
    /// task and returns the signal its reader loop should watch for forced
    /// closes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(
        &self,
        player_id: PlayerId,
        remote_addr: SocketAddr,
        writer: ConnectionWriter,
    ) -> Arc<CloseSignal> {
        let (outbox, queued) = mpsc::channel(OUTBOX_CAPACITY);
        let connection = Arc::new(ClientConnection::new(player_id, remote_addr, outbox));
        let close = connection.close_signal();

        tokio::spawn(drain_outbox(
            player_id,
            writer,
            queued,
            Arc::clone(&close),
            Arc::clone(&self.connections),
            self.send_timeout,
        ));

        if let Some(previous) = self.connections.insert(player_id, connection) {
            warn!("Replaced stale connection for player {}", player_id);
            previous.request_close();
        }
        info!("🔗 Connection {} from {}", player_id, remote_addr);
        close
    }

    /// Removes a connection from the manager and returns it. Its outgoing
    /// task finishes the lines already queued and then shuts the socket.
    pub fn unregister(&self, player_id: PlayerId) -> Option<Arc<ClientConnection>> {
        let removed = self.connections.remove(&player_id).map(|(_, c)| c);
        if let Some(connection) = &removed {
            info!(
                "❌ Connection {} from {} disconnected",
                player_id, connection.remote_addr
            );
        }
        removed
    }

    pub fn get(&self, player_id: PlayerId) -> Option<Arc<ClientConnection>> {
        self.connections.get(&player_id).map(|c| Arc::clone(c.value()))
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.connections.contains_key(&player_id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.connections.iter().map(|c| *c.key()).collect()
    }

    /// Sends one line to a player.
    ///
    /// The line is queued before this returns; the future only reports
    /// whether it was written, so it may be dropped or spawned. Unknown
    /// players are a silent no-op, and failures are logged and swallowed.
    pub fn send_to(
        &self,
        player_id: PlayerId,
        line: &str,
    ) -> impl Future<Output = bool> + Send + 'static {
        let receipt = match self.get(player_id) {
            Some(connection) => self.enqueue(&connection, line),
            None => {
                trace!("Dropping message for unknown connection {}", player_id);
                None
            }
        };

        async move {
            match receipt {
                Some(receipt) => receipt.await.unwrap_or(false),
                None => false,
            }
        }
    }

    /// Sends one line to every open connection except `exclude`.
    ///
    /// Queues to every target before returning. The future completes once
    /// every write has finished, failed or timed out, and yields how many
    /// succeeded; a slow peer only delays that count.
    pub fn broadcast(
        &self,
        line: &str,
        exclude: Option<PlayerId>,
    ) -> impl Future<Output = usize> + Send + 'static {
        let targets: Vec<Arc<ClientConnection>> = self
            .connections
            .iter()
            .filter(|c| Some(*c.key()) != exclude)
            .map(|c| Arc::clone(c.value()))
            .collect();
        let attempted = targets.len();
        let receipts: Vec<oneshot::Receiver<bool>> = targets
            .iter()
            .filter_map(|connection| self.enqueue(connection, line))
            .collect();

        async move {
            let delivered = join_all(receipts)
                .await
                .into_iter()
                .filter(|sent| matches!(sent, Ok(true)))
                .count();
            debug!(
                "📡 Broadcast delivered to {}/{} connections",
                delivered, attempted
            );
            delivered
        }
    }

    fn enqueue(
        &self,
        connection: &Arc<ClientConnection>,
        line: &str,
    ) -> Option<oneshot::Receiver<bool>> {
        match connection.queue(line) {
            Ok(receipt) => Some(receipt),
            Err(QueueError::Closing) => {
                trace!("Skipping closing connection {}", connection.player_id);
                None
            }
            Err(QueueError::Full) => {
                warn!(
                    "🐌 Connection {} has {} unsent lines, dropping it",
                    connection.player_id, OUTBOX_CAPACITY
                );
                connection.request_close();
                let signal = connection.close_signal();
                remove_if_current(&self.connections, connection.player_id, &signal);
                None
            }
        }
    }

    /// Asks a connection's reader loop to stop. Returns false if unknown.
    pub fn close(&self, player_id: PlayerId) -> bool {
        match self.get(player_id) {
            Some(connection) => {
                connection.request_close();
                true
            }
            None => false,
        }
    }

    /// Forcibly closes every open connection and returns how many were
    /// signalled.
    pub fn close_all(&self) -> usize {
        let connections: Vec<Arc<ClientConnection>> =
            self.connections.iter().map(|c| Arc::clone(c.value())).collect();
        for connection in &connections {
            connection.request_close();
        }
        if !connections.is_empty() {
            info!("🔌 Closing {} open connection(s)", connections.len());
        }
        connections.len()
    }
}

/// Unregisters `player_id` only while the entry still belongs to `signal`,
/// so a replacement connection under the same id survives.
fn remove_if_current(
    connections: &ConnectionMap,
    player_id: PlayerId,
    signal: &Arc<CloseSignal>,
) {
    let removed = connections
        .remove_if(&player_id, |_, c| Arc::ptr_eq(&c.close_signal(), signal))
        .is_some();
    if removed {
        info!("❌ Connection {} dropped after a failed send", player_id);
    }
}

/// Outgoing task of one connection.
///
/// Ends when every sender is gone, after writing what is still queued, or at
/// the first failed write. A failed write leaves a partial line on the wire,
/// so the connection is closed rather than reused.
async fn drain_outbox(
    player_id: PlayerId,
    mut writer: ConnectionWriter,
    mut queued: mpsc::Receiver<Outgoing>,
    signal: Arc<CloseSignal>,
    connections: Arc<ConnectionMap>,
    send_timeout: Duration,
) {
    while let Some(Outgoing { line, delivered }) = queued.recv().await {
        let write = write_line(&mut writer, &line);
        let outcome = match tokio::time::timeout(send_timeout, write).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {send_timeout:?}")),
        };

        if let Err(reason) = outcome {
            warn!("Failed to send to connection {}: {}", player_id, reason);
            signal.request();
            remove_if_current(&connections, player_id, &signal);

            queued.close();
            let _ = delivered.send(false);
            while let Ok(pending) = queued.try_recv() {
                let _ = pending.delivered.send(false);
            }
            return;
        }
        let _ = delivered.send(true);
    }

    match tokio::time::timeout(send_timeout, writer.shutdown()).await {
        Ok(Ok(())) => trace!("Write half of connection {} shut down", player_id),
        Ok(Err(e)) => trace!("Shutdown of connection {} failed: {}", player_id, e),
        Err(_) => trace!("Shutdown of connection {} timed out", player_id),
    }
}

async fn write_line(writer: &mut ConnectionWriter, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    if !line.ends_with('\n') {
        writer.write_all(b"\n").await?;
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::time::Instant;

    fn addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn attach(manager: &ConnectionManager, id: u64) -> DuplexStream {
        let (local, remote) = tokio::io::duplex(1024);
        manager.register(PlayerId(id), addr(), Box::new(local));
        remote
    }

    async fn read_text(stream: &mut DuplexStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn send_to_appends_newline() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        let mut peer = attach(&manager, 1);

        assert!(manager.send_to(PlayerId(1), "hello").await);
        assert_eq!(read_text(&mut peer, 6).await, "hello\n");
    }

    #[tokio::test]
    async fn send_to_unknown_player_is_noop() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        assert!(!manager.send_to(PlayerId(42), "anyone?").await);
    }

    #[tokio::test]
    async fn dropped_send_future_still_delivers_in_order() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        let mut peer = attach(&manager, 1);

        drop(manager.send_to(PlayerId(1), "first"));
        drop(manager.broadcast("second", None));
        assert!(manager.send_to(PlayerId(1), "third").await);

        assert_eq!(read_text(&mut peer, 19).await, "first\nsecond\nthird\n");
    }

    #[tokio::test]
    async fn broadcast_honours_exclusion() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        let mut first = attach(&manager, 1);
        let mut second = attach(&manager, 2);
        let _third = attach(&manager, 3);

        assert_eq!(manager.broadcast("joined", Some(PlayerId(3))).await, 2);
        assert_eq!(read_text(&mut first, 7).await, "joined\n");
        assert_eq!(read_text(&mut second, 7).await, "joined\n");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_does_not_block_broadcast_forever() {
        let manager = ConnectionManager::new(Duration::from_millis(200));

        // A tiny duplex buffer that nobody drains fills up and blocks writes.
        let (stalled, _stalled_peer) = tokio::io::duplex(4);
        manager.register(PlayerId(1), addr(), Box::new(stalled));
        let mut healthy = attach(&manager, 2);

        let delivered = manager.broadcast("a fairly long line", None).await;
        assert_eq!(delivered, 1);
        assert_eq!(read_text(&mut healthy, 19).await, "a fairly long line\n");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_peer_is_closed_and_unregistered() {
        let manager = ConnectionManager::new(Duration::from_millis(200));
        let (stalled, mut stalled_peer) = tokio::io::duplex(4);
        let close = manager.register(PlayerId(1), addr(), Box::new(stalled));
        let mut healthy = attach(&manager, 2);

        assert!(!manager.send_to(PlayerId(1), "hello world").await);
        assert!(!manager.contains(PlayerId(1)));
        assert!(close.is_requested());
        tokio::time::timeout(Duration::from_millis(10), close.wait())
            .await
            .expect("reader loop should be woken");

        // Later sends skip the dropped peer without waiting on it.
        let started = Instant::now();
        assert!(!manager.send_to(PlayerId(1), "ok").await);
        assert_eq!(manager.broadcast("next", None).await, 1);
        assert_eq!(manager.broadcast("again", None).await, 1);
        assert!(started.elapsed() < manager.send_timeout());
        assert_eq!(read_text(&mut healthy, 11).await, "next\nagain\n");

        // The peer sees the truncated line and then end of stream, never a
        // later line glued onto it.
        let mut seen = Vec::new();
        stalled_peer.read_to_end(&mut seen).await.unwrap();
        assert_eq!(seen, b"hell");
    }

    #[tokio::test]
    async fn full_outbox_drops_slow_consumer() {
        let manager = ConnectionManager::new(Duration::from_secs(60));
        let (stalled, _stalled_peer) = tokio::io::duplex(4);
        let close = manager.register(PlayerId(1), addr(), Box::new(stalled));

        // Nothing yields between these sends, so the outgoing task cannot
        // drain the queue.
        for i in 0..=OUTBOX_CAPACITY {
            drop(manager.send_to(PlayerId(1), &format!("line {i}")));
        }

        assert!(!manager.contains(PlayerId(1)));
        assert!(close.is_requested());
    }

    #[tokio::test]
    async fn write_to_closed_peer_is_swallowed() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        let peer = attach(&manager, 1);
        drop(peer);

        assert!(!manager.send_to(PlayerId(1), "gone").await);
        assert!(!manager.contains(PlayerId(1)));
    }

    #[tokio::test]
    async fn close_all_signals_every_reader() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        let _a = attach(&manager, 1);
        let (local, _remote) = tokio::io::duplex(64);
        let close = manager.register(PlayerId(2), addr(), Box::new(local));

        assert_eq!(manager.close_all(), 2);
        tokio::time::timeout(Duration::from_millis(100), close.wait())
            .await
            .expect("stored permit should wake the reader");
    }

    #[tokio::test]
    async fn unregister_ends_the_stream_after_queued_lines() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        let mut peer = attach(&manager, 5);

        drop(manager.send_to(PlayerId(5), "bye"));
        assert!(manager.unregister(PlayerId(5)).is_some());
        assert!(manager.unregister(PlayerId(5)).is_none());
        assert_eq!(manager.count(), 0);

        let mut seen = String::new();
        peer.read_to_string(&mut seen).await.unwrap();
        assert_eq!(seen, "bye\n");
    }

    #[tokio::test]
    async fn replacing_a_connection_keeps_the_new_one() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        let (old, _old_peer) = tokio::io::duplex(64);
        let old_close = manager.register(PlayerId(7), addr(), Box::new(old));
        let mut fresh = attach(&manager, 7);

        assert!(old_close.is_requested());
        assert!(manager.send_to(PlayerId(7), "still here").await);
        assert_eq!(read_text(&mut fresh, 11).await, "still here\n");
    }
}
