//! Core lobby server implementation.
//!
//! This module contains the main `LobbyServer` struct: the accept loop that
//! turns sockets into registered connections, and the read/administrative
//! API used by the status reporter and other external collaborators.

use crate::{
    config::ServerConfig,
    context::LobbyContext,
    error::ServerError,
    messaging::{
        commands::SERVER_FULL_MESSAGE, event_channel, EventDispatcher, EventSender, ServerEvent,
    },
    player::{Player, PlayerId, PlayerRegistry},
    server::handlers::handle_connection,
    session::{Session, SessionId, SessionRegistry},
    shutdown::ShutdownState,
    status::StatusSnapshot,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Pause after a failed `accept` so a persistent error cannot spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Tells a client the server is full, then closes its socket.
async fn reject(mut stream: TcpStream, send_timeout: Duration) {
    let reply = format!("{SERVER_FULL_MESSAGE}\n");
    let write = async {
        stream.write_all(reply.as_bytes()).await?;
        stream.shutdown().await
    };
    match tokio::time::timeout(send_timeout, write).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Failed to send server-full reply: {}", e),
        Err(_) => debug!("Server-full reply timed out"),
    }
}

/// The core lobby server structure.
///
/// `LobbyServer` owns the shared [`LobbyContext`] (player registry, session
/// registry, connection manager) and the player id counter. Connection
/// handlers only publish notifications; every reaction to them happens in
/// the single [`EventDispatcher`] task started by [`LobbyServer::serve`].
///
/// # Architecture
///
/// * **Acceptor**: assigns ids, registers writers, spawns one handler per socket
/// * **Handlers**: frame inbound bytes into lines and publish them in order
/// * **Dispatcher**: applies commands to the registries and fans out replies
/// * **Session timers**: drive delayed lifecycle transitions per session
pub struct LobbyServer {
    /// Shared state handed to handlers and the dispatcher
    context: Arc<LobbyContext>,

    /// Next player id to hand out; ids are never reused within a run
    next_player_id: AtomicU64,
}

impl LobbyServer {
    /// Creates a new lobby server with the specified configuration.
    ///
    /// Nothing is bound until [`LobbyServer::bind`] or
    /// [`LobbyServer::start`] is called.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            context: Arc::new(LobbyContext::new(config)),
            next_player_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    pub fn context(&self) -> Arc<LobbyContext> {
        Arc::clone(&self.context)
    }

    /// Binds the configured listening address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Network`] when the address cannot be bound.
    /// This is fatal: the server does not start.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = self.context.config.bind_address;
        TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {address}: {e}")))
    }

    /// Binds the listener and serves until shutdown is initiated.
    pub async fn start(&self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_state).await
    }

    /// Runs the accept loop on an already bound listener.
    ///
    /// # Shutdown Sequence
    ///
    /// 1. Stop accepting and drop the listener
    /// 2. Force-close every open connection
    /// 3. Give the dispatcher up to one send timeout to drain the resulting
    ///    disconnect notifications
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Failed to read local address: {e}")))?;
        info!(
            "🚀 {} listening on {}",
            self.context.config.server_name, local_addr
        );

        let (events, receiver) = event_channel(self.context.config.event_queue_capacity);
        let dispatcher =
            tokio::spawn(EventDispatcher::new(Arc::clone(&self.context)).run(receiver));

        loop {
            tokio::select! {
                _ = shutdown_state.wait() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        self.accept_connection(stream, remote_addr, &events);
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        info!("🧹 Performing server cleanup...");
        self.context.connections.close_all();
        drop(events);

        if tokio::time::timeout(self.context.config.send_timeout(), dispatcher)
            .await
            .is_err()
        {
            warn!("Event dispatcher did not drain before the shutdown deadline");
        }
        info!("✅ Server stopped");
        Ok(())
    }

    /// Registers an accepted socket and hands it to its own task. Nothing
    /// here waits on the peer or on the event queue, so the accept loop
    /// keeps watching for shutdown.
    fn accept_connection(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
        events: &EventSender,
    ) {
        let config = &self.context.config;
        let open = self.context.connections.count();
        if open >= config.max_players {
            if config.enforce_max_players {
                warn!(
                    "🚫 Rejecting {}: server full ({}/{})",
                    remote_addr, open, config.max_players
                );
                tokio::spawn(reject(stream, config.send_timeout()));
                return;
            }
            warn!(
                "Player count {} exceeds configured maximum {}",
                open + 1,
                config.max_players
            );
        }

        if let Err(e) = stream.set_nodelay(true) {
            trace!("Could not set TCP_NODELAY for {}: {}", remote_addr, e);
        }

        let player_id = PlayerId(self.next_player_id.fetch_add(1, Ordering::Relaxed));
        let (reader, writer) = stream.into_split();
        let close = self
            .context
            .connections
            .register(player_id, remote_addr, Box::new(writer));

        let context = Arc::clone(&self.context);
        let events = events.clone();
        tokio::spawn(async move {
            // The connect notification goes out before any of the
            // connection's messages.
            if let Err(e) = events
                .emit(ServerEvent::connected(player_id, remote_addr))
                .await
            {
                error!("Dropping connection {}: {}", player_id, e);
                context.connections.unregister(player_id);
                return;
            }
            handle_connection(reader, player_id, close, context, events).await;
        });
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.context.players
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.context.sessions
    }

    pub fn player_count(&self) -> usize {
        self.context.players.count()
    }

    pub fn all_players(&self) -> Vec<Player> {
        self.context.players.list()
    }

    /// Sessions that are `Waiting`, `Starting` or `InProgress`.
    pub fn active_sessions(&self) -> Vec<Session> {
        self.context.sessions.active_sessions()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.context.status()
    }

    /// Creates a `Waiting` session and fills member names from the player
    /// registry.
    pub fn create_session(&self, game_mode: &str, member_ids: &[PlayerId]) -> SessionId {
        let session_id = self.context.sessions.create(game_mode, member_ids);
        self.context
            .sessions
            .sync_member_names(session_id, &self.context.players);
        session_id
    }

    pub fn start_session(&self, session_id: SessionId) -> bool {
        self.context.sessions.start(session_id)
    }

    pub fn end_session(&self, session_id: SessionId) -> bool {
        self.context.sessions.end(session_id)
    }

    pub fn add_session_member(&self, session_id: SessionId, player_id: PlayerId) -> bool {
        let added = self.context.sessions.add_member(session_id, player_id);
        if added {
            self.context
                .sessions
                .sync_member_names(session_id, &self.context.players);
        }
        added
    }

    pub fn remove_session_member(&self, session_id: SessionId, player_id: PlayerId) -> bool {
        self.context.sessions.remove_member(session_id, player_id)
    }

    /// Ends every `Starting` or `InProgress` session.
    pub fn stop_all_sessions(&self) -> usize {
        self.context.sessions.stop_all()
    }
}
