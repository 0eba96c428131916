//! Connection handling logic for TCP clients.
//!
//! One handler task runs per accepted connection. It owns the read half of
//! the socket, turns the byte stream into command lines and publishes them,
//! and tears the connection down when the stream ends or the server asks it
//! to close.

use crate::{
    connection::{CloseSignal, LineFramer},
    context::LobbyContext,
    messaging::{DisconnectReason, EventSender, ServerEvent},
    player::PlayerId,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, trace, warn};

/// Handles a single client connection from its first read to cleanup.
///
/// # Connection Flow
///
/// 1. Read into a fixed-size buffer until EOF, an I/O error, a framing
///    error or a close request
/// 2. Publish every complete line as a message notification, in order
/// 3. Unregister the connection; its outgoing task flushes what is queued
///    and shuts down the write half
/// 4. Publish the disconnect notification
///
/// The caller must have registered the connection with the context's
/// connection manager and published its connect notification before
/// spawning this.
pub async fn handle_connection<R>(
    mut reader: R,
    player_id: PlayerId,
    close: Arc<CloseSignal>,
    context: Arc<LobbyContext>,
    events: EventSender,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; context.config.read_buffer_size.max(1)];
    let mut framer = LineFramer::new(context.config.max_line_length);

    let reason = loop {
        tokio::select! {
            _ = close.wait() => {
                debug!("🔌 Closing connection {} on server request", player_id);
                break DisconnectReason::ServerClosed;
            }
            read = reader.read(&mut buffer) => match read {
                Ok(0) => {
                    if let Some(line) = framer.finish() {
                        publish(&events, player_id, line).await;
                    }
                    debug!("🔌 Client {} closed the connection", player_id);
                    break DisconnectReason::ClientClosed;
                }
                Ok(n) => {
                    trace!("📥 {} byte(s) from connection {}", n, player_id);
                    match framer.push(&buffer[..n]) {
                        Ok(lines) => {
                            for line in lines {
                                publish(&events, player_id, line).await;
                            }
                        }
                        Err(e) => {
                            warn!("Protocol violation on connection {}: {}", player_id, e);
                            break DisconnectReason::ProtocolViolation(e.to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!("Read error on connection {}: {}", player_id, e);
                    break DisconnectReason::ConnectionError(e.to_string());
                }
            },
        }
    };

    context.connections.unregister(player_id);

    if let Err(e) = events
        .emit(ServerEvent::disconnected(player_id, reason))
        .await
    {
        error!("Failed to publish disconnect of {}: {}", player_id, e);
    }
}

async fn publish(events: &EventSender, player_id: PlayerId, line: String) {
    if let Err(e) = events.emit(ServerEvent::message(player_id, line)).await {
        error!("Failed to publish message from {}: {}", player_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::messaging::event_channel;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn texts(events: &[ServerEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::MessageReceived(m) => Some(m.text.clone()),
                _ => None,
            })
            .collect()
    }

    async fn drain(mut receiver: tokio::sync::mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }
        events
    }

    /// Small buffers so a single line needs several reads.
    fn setup() -> (Arc<LobbyContext>, Arc<CloseSignal>, tokio::io::DuplexStream) {
        let context = Arc::new(LobbyContext::new(ServerConfig {
            read_buffer_size: 8,
            max_line_length: 32,
            ..Default::default()
        }));
        let (write_local, write_remote) = tokio::io::duplex(256);
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let close = context
            .connections
            .register(PlayerId(1), addr, Box::new(write_local));
        (context, close, write_remote)
    }

    #[tokio::test]
    async fn lines_split_across_small_reads_are_reassembled() {
        let (context, close, _out) = setup();
        let (events, receiver) = event_channel(16);
        let (mut client, server_side) = tokio::io::duplex(64);

        let handler = tokio::spawn(handle_connection(
            server_side,
            PlayerId(1),
            close,
            Arc::clone(&context),
            events,
        ));

        client.write_all(b"chat hello wor").await.unwrap();
        client.write_all(b"ld\nready\nsta").await.unwrap();
        client.write_all(b"tus").await.unwrap();
        drop(client);
        handler.await.unwrap();

        let events = drain(receiver).await;
        assert_eq!(texts(&events), ["chat hello world", "ready", "status"]);
        assert!(matches!(
            events.last(),
            Some(ServerEvent::PlayerDisconnected(d)) if d.reason == DisconnectReason::ClientClosed
        ));
        assert!(!context.connections.contains(PlayerId(1)));
    }

    #[tokio::test]
    async fn overlong_line_closes_connection() {
        let (context, close, _out) = setup();
        let (events, receiver) = event_channel(16);
        let (mut client, server_side) = tokio::io::duplex(128);

        let handler = tokio::spawn(handle_connection(
            server_side,
            PlayerId(1),
            close,
            Arc::clone(&context),
            events,
        ));

        client.write_all(&[b'a'; 40]).await.unwrap();
        handler.await.unwrap();

        let events = drain(receiver).await;
        assert!(texts(&events).is_empty());
        assert!(matches!(
            events.last(),
            Some(ServerEvent::PlayerDisconnected(d))
                if matches!(d.reason, DisconnectReason::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn close_request_ends_reader_loop() {
        let (context, close, _out) = setup();
        let (events, receiver) = event_channel(16);
        let (_client, server_side) = tokio::io::duplex(64);

        let handler = tokio::spawn(handle_connection(
            server_side,
            PlayerId(1),
            close,
            Arc::clone(&context),
            events,
        ));

        assert_eq!(context.connections.close_all(), 1);
        tokio::time::timeout(Duration::from_secs(1), handler)
            .await
            .expect("handler should stop")
            .unwrap();

        let events = drain(receiver).await;
        assert!(matches!(
            events.last(),
            Some(ServerEvent::PlayerDisconnected(d)) if d.reason == DisconnectReason::ServerClosed
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_send_tears_down_connection() {
        let context = Arc::new(LobbyContext::new(ServerConfig {
            send_timeout_ms: 200,
            ..Default::default()
        }));
        // Nobody reads this pipe, so the second write blocks.
        let (stalled, _stalled_peer) = tokio::io::duplex(4);
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let close = context
            .connections
            .register(PlayerId(1), addr, Box::new(stalled));
        let (events, receiver) = event_channel(16);
        let (_client, server_side) = tokio::io::duplex(64);

        let handler = tokio::spawn(handle_connection(
            server_side,
            PlayerId(1),
            close,
            Arc::clone(&context),
            events,
        ));

        assert!(!context.connections.send_to(PlayerId(1), "hello world").await);
        tokio::time::timeout(Duration::from_secs(1), handler)
            .await
            .expect("handler should stop after the failed send")
            .unwrap();

        let events = drain(receiver).await;
        assert!(matches!(
            events.last(),
            Some(ServerEvent::PlayerDisconnected(d)) if d.reason == DisconnectReason::ServerClosed
        ));
        assert!(!context.connections.contains(PlayerId(1)));
    }
}
