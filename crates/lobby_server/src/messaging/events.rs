//! Notification types published by the acceptor and connection handlers.

use crate::error::ServerError;
use crate::player::PlayerId;
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConnectedEvent {
    pub player_id: PlayerId,
    pub remote_addr: SocketAddr,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceivedEvent {
    pub player_id: PlayerId,
    /// One complete command line, without its terminator
    pub text: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDisconnectedEvent {
    pub player_id: PlayerId,
    pub reason: DisconnectReason,
    pub timestamp: u64,
}

/// Why a connection's reader loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The peer closed its side of the stream
    ClientClosed,
    /// A read failed
    ConnectionError(String),
    /// The peer sent something the framing layer rejected
    ProtocolViolation(String),
    /// The server closed the connection
    ServerClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerEvent {
    PlayerConnected(PlayerConnectedEvent),
    MessageReceived(MessageReceivedEvent),
    PlayerDisconnected(PlayerDisconnectedEvent),
}

impl ServerEvent {
    pub fn connected(player_id: PlayerId, remote_addr: SocketAddr) -> Self {
        Self::PlayerConnected(PlayerConnectedEvent {
            player_id,
            remote_addr,
            timestamp: current_timestamp(),
        })
    }

    pub fn message(player_id: PlayerId, text: String) -> Self {
        Self::MessageReceived(MessageReceivedEvent {
            player_id,
            text,
            timestamp: current_timestamp(),
        })
    }

    pub fn disconnected(player_id: PlayerId, reason: DisconnectReason) -> Self {
        Self::PlayerDisconnected(PlayerDisconnectedEvent {
            player_id,
            reason,
            timestamp: current_timestamp(),
        })
    }

    pub fn player_id(&self) -> PlayerId {
        match self {
            Self::PlayerConnected(e) => e.player_id,
            Self::MessageReceived(e) => e.player_id,
            Self::PlayerDisconnected(e) => e.player_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerConnected(_) => "player_connected",
            Self::MessageReceived(_) => "message_received",
            Self::PlayerDisconnected(_) => "player_disconnected",
        }
    }
}

/// Producer side of the notification channel.
///
/// `emit` waits for channel capacity rather than dropping notifications, so
/// a busy dispatcher pushes back on the connections feeding it.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<ServerEvent>,
}

impl EventSender {
    pub async fn emit(&self, event: ServerEvent) -> Result<(), ServerError> {
        let kind = event.kind();
        self.sender
            .send(event)
            .await
            .map_err(|_| ServerError::Internal(format!("event dispatcher stopped, dropped {kind}")))
    }
}

/// Creates the bounded notification channel.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<ServerEvent>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (EventSender { sender }, receiver)
}
