//! Event dispatcher: reacts to connection notifications.
//!
//! Events are handled one at a time in arrival order, so registry updates
//! never interleave. Replies are only queued on the target connections and
//! their delivery runs in the background, so a slow peer never holds up the
//! next event. Each event runs inside its own unwind boundary: a panic while
//! handling one client's command is logged and the next event still runs.

use super::commands::{
    chat_line, join_announcement, leave_announcement, welcome_message, Command, HELP_MESSAGE,
    READY_CONFIRMATION, UNREADY_CONFIRMATION,
};
use super::events::{
    MessageReceivedEvent, PlayerConnectedEvent, PlayerDisconnectedEvent, ServerEvent,
};
use crate::context::LobbyContext;
use crate::player::default_display_name;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

pub struct EventDispatcher {
    context: Arc<LobbyContext>,
}

impl EventDispatcher {
    pub fn new(context: Arc<LobbyContext>) -> Self {
        Self { context }
    }

    /// Consumes events until every sender has been dropped.
    pub async fn run(self, events: mpsc::Receiver<ServerEvent>) {
        let dispatcher = Arc::new(self);
        consume_isolated(events, move |event| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.dispatch(event) }
        })
        .await;
    }

    /// Applies one event. Must run inside a Tokio runtime, which carries the
    /// queued replies to completion.
    pub fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::PlayerConnected(event) => self.on_player_connected(event),
            ServerEvent::MessageReceived(event) => self.on_message_received(event),
            ServerEvent::PlayerDisconnected(event) => self.on_player_disconnected(event),
        }
    }

    fn on_player_connected(&self, event: PlayerConnectedEvent) {
        let ctx = &self.context;
        let player = ctx.players.add(event.player_id, event.remote_addr);
        info!(
            "👋 {} (player {}) joined from {}",
            player.display_name, player.id, event.remote_addr
        );

        let welcome = welcome_message(&ctx.config.server_name, &player.display_name, player.id);
        deliver(ctx.connections.send_to(player.id, &welcome));
        deliver(
            ctx.connections
                .broadcast(&join_announcement(&player.display_name), Some(player.id)),
        );
    }

    fn on_player_disconnected(&self, event: PlayerDisconnectedEvent) {
        let ctx = &self.context;
        let player_id = event.player_id;
        let display_name = ctx
            .players
            .display_name(player_id)
            .unwrap_or_else(|| default_display_name(player_id));

        ctx.players.remove(player_id);
        let left = ctx.sessions.remove_from_active(player_id);
        info!(
            "🚪 {} (player {}) left: {:?}; removed from {} session(s)",
            display_name,
            player_id,
            event.reason,
            left.len()
        );

        deliver(ctx.connections.broadcast(&leave_announcement(&display_name), None));
    }

    fn on_message_received(&self, event: MessageReceivedEvent) {
        let ctx = &self.context;
        let player_id = event.player_id;
        let Some(command) = Command::parse(&event.text) else {
            return;
        };
        trace!("⌨️ Player {} sent {:?}", player_id, command);

        match command {
            Command::Ready => {
                if ctx.players.set_ready(player_id, true) {
                    deliver(ctx.connections.send_to(player_id, READY_CONFIRMATION));
                }
            }
            Command::Unready => {
                if ctx.players.set_ready(player_id, false) {
                    deliver(ctx.connections.send_to(player_id, UNREADY_CONFIRMATION));
                }
            }
            Command::Status => {
                let summary = ctx.status().summary_line();
                deliver(ctx.connections.send_to(player_id, &summary));
            }
            Command::Chat(text) => {
                if text.is_empty() {
                    return;
                }
                let display_name = ctx
                    .players
                    .display_name(player_id)
                    .unwrap_or_else(|| default_display_name(player_id));
                deliver(ctx.connections.broadcast(&chat_line(&display_name, &text), None));
            }
            Command::Unknown(name) => {
                debug!("Unknown command '{}' from player {}", name, player_id);
                deliver(ctx.connections.send_to(player_id, HELP_MESSAGE));
            }
        }
    }
}

/// Feeds events to `handle` one at a time until every sender is dropped.
/// A panic inside `handle` is logged and does not stop the loop.
pub(crate) async fn consume_isolated<F, Fut>(mut events: mpsc::Receiver<ServerEvent>, mut handle: F)
where
    F: FnMut(ServerEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    debug!("📬 Event dispatcher started");
    while let Some(event) = events.recv().await {
        let kind = event.kind();
        let player_id = event.player_id();
        if AssertUnwindSafe(handle(event))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(
                "💥 Handler for {} from player {} panicked; continuing",
                kind, player_id
            );
        }
    }
    debug!("📭 Event dispatcher stopped");
}

/// Lets an already queued delivery finish in the background.
fn deliver<F>(delivery: F)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(delivery);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::messaging::events::DisconnectReason;
    use crate::player::PlayerId;
    use crate::session::SessionState;
    use std::net::SocketAddr;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};

    struct Harness {
        context: Arc<LobbyContext>,
        dispatcher: EventDispatcher,
    }

    impl Harness {
        fn new() -> Self {
            let context = Arc::new(LobbyContext::new(ServerConfig {
                server_name: "Test Lobby".into(),
                max_players: 4,
                ..Default::default()
            }));
            let dispatcher = EventDispatcher::new(Arc::clone(&context));
            Self {
                context,
                dispatcher,
            }
        }

        /// Registers a connection backed by an in-memory pipe and announces it.
        fn connect(&self, id: u64) -> Lines<BufReader<DuplexStream>> {
            let (local, remote) = tokio::io::duplex(4096);
            let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
            self.context
                .connections
                .register(PlayerId(id), addr, Box::new(local));
            self.dispatcher
                .dispatch(ServerEvent::connected(PlayerId(id), addr));
            BufReader::new(remote).lines()
        }

        fn say(&self, id: u64, text: &str) {
            self.dispatcher
                .dispatch(ServerEvent::message(PlayerId(id), text.to_string()));
        }

        fn disconnect(&self, id: u64) {
            self.context.connections.unregister(PlayerId(id));
            self.dispatcher.dispatch(ServerEvent::disconnected(
                PlayerId(id),
                DisconnectReason::ClientClosed,
            ));
        }
    }

    async fn next(lines: &mut Lines<BufReader<DuplexStream>>) -> String {
        lines.next_line().await.unwrap().expect("expected a line")
    }

    #[tokio::test]
    async fn connect_welcomes_and_announces_to_others() {
        let harness = Harness::new();
        let mut first = harness.connect(1);
        assert_eq!(
            next(&mut first).await,
            "Welcome to Test Lobby, Player1! Your player id is 1."
        );

        let mut second = harness.connect(2);
        assert_eq!(
            next(&mut second).await,
            "Welcome to Test Lobby, Player2! Your player id is 2."
        );
        assert_eq!(next(&mut first).await, "Player2 joined the lobby.");
        assert_eq!(harness.context.players.count(), 2);
    }

    #[tokio::test]
    async fn ready_and_unready_toggle_flag() {
        let harness = Harness::new();
        let mut lines = harness.connect(1);
        next(&mut lines).await;

        harness.say(1, "READY");
        assert_eq!(next(&mut lines).await, READY_CONFIRMATION);
        assert!(harness.context.players.get(PlayerId(1)).unwrap().ready);

        harness.say(1, "unready");
        assert_eq!(next(&mut lines).await, UNREADY_CONFIRMATION);
        assert!(!harness.context.players.get(PlayerId(1)).unwrap().ready);
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let harness = Harness::new();
        let mut lines = harness.connect(1);
        next(&mut lines).await;
        harness.context.sessions.create("Deathmatch", &[PlayerId(1)]);

        harness.say(1, "status");
        assert_eq!(
            next(&mut lines).await,
            "Server: Test Lobby | Players: 1/4 | Active sessions: 1"
        );
    }

    #[tokio::test]
    async fn chat_reaches_everyone_including_sender() {
        let harness = Harness::new();
        let mut first = harness.connect(1);
        let mut second = harness.connect(2);
        next(&mut first).await;
        next(&mut first).await;
        next(&mut second).await;

        harness.say(1, "chat hi");
        assert_eq!(next(&mut first).await, "Player1: hi");
        assert_eq!(next(&mut second).await, "Player1: hi");
    }

    #[tokio::test]
    async fn unknown_command_gets_help_without_mutation() {
        let harness = Harness::new();
        let mut lines = harness.connect(1);
        next(&mut lines).await;
        let before = harness.context.players.get(PlayerId(1)).unwrap();

        harness.say(1, "jump high");
        assert_eq!(next(&mut lines).await, HELP_MESSAGE);

        let after = harness.context.players.get(PlayerId(1)).unwrap();
        assert_eq!(before.ready, after.ready);
        assert_eq!(before.state, after.state);
        assert_eq!(harness.context.players.count(), 1);
        assert_eq!(harness.context.sessions.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cleans_up_and_announces() {
        let harness = Harness::new();
        let mut stays = harness.connect(1);
        let _leaves = harness.connect(2);
        next(&mut stays).await;
        next(&mut stays).await;

        let shared = harness
            .context
            .sessions
            .create("Coop", &[PlayerId(1), PlayerId(2)]);
        let solo = harness.context.sessions.create("Solo", &[PlayerId(2)]);

        harness.disconnect(2);
        assert_eq!(next(&mut stays).await, "Player2 left the lobby.");
        assert!(harness.context.players.get(PlayerId(2)).is_none());

        let shared = harness.context.sessions.get(shared).unwrap();
        assert_eq!(shared.member_ids(), vec![PlayerId(1)]);
        assert_eq!(
            harness.context.sessions.get(solo).unwrap().state,
            SessionState::Finished
        );
    }

    #[tokio::test]
    async fn disconnect_of_unknown_player_uses_fallback_name() {
        let harness = Harness::new();
        let mut lines = harness.connect(1);
        next(&mut lines).await;

        harness.disconnect(77);
        assert_eq!(next(&mut lines).await, "Player77 left the lobby.");
        assert_eq!(harness.context.players.count(), 1);
    }

    #[tokio::test]
    async fn run_processes_queue_in_order_until_senders_drop() {
        let harness = Harness::new();
        let (local, remote) = tokio::io::duplex(4096);
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        harness
            .context
            .connections
            .register(PlayerId(1), addr, Box::new(local));

        let (sender, receiver) = crate::messaging::event_channel(4);
        let context = Arc::clone(&harness.context);
        let task = tokio::spawn(EventDispatcher::new(context).run(receiver));

        sender.emit(ServerEvent::connected(PlayerId(1), addr)).await.unwrap();
        sender
            .emit(ServerEvent::message(PlayerId(1), "ready".into()))
            .await
            .unwrap();
        sender
            .emit(ServerEvent::message(PlayerId(1), "chat done".into()))
            .await
            .unwrap();
        drop(sender);
        task.await.unwrap();

        let mut lines = BufReader::new(remote).lines();
        assert!(next(&mut lines).await.starts_with("Welcome"));
        assert_eq!(next(&mut lines).await, READY_CONFIRMATION);
        assert_eq!(next(&mut lines).await, "Player1: done");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_does_not_delay_other_players() {
        let harness = Harness::new();
        let mut healthy = harness.connect(1);
        next(&mut healthy).await;

        // A pipe nobody reads: the welcome line alone overflows it.
        let (stalled, _stalled_peer) = tokio::io::duplex(4);
        let addr: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        harness
            .context
            .connections
            .register(PlayerId(2), addr, Box::new(stalled));
        harness
            .dispatcher
            .dispatch(ServerEvent::connected(PlayerId(2), addr));
        assert_eq!(next(&mut healthy).await, "Player2 joined the lobby.");

        let started = tokio::time::Instant::now();
        harness.say(1, "chat one");
        harness.say(1, "chat two");
        harness.say(1, "status");
        assert_eq!(next(&mut healthy).await, "Player1: one");
        assert_eq!(next(&mut healthy).await, "Player1: two");
        assert!(next(&mut healthy).await.starts_with("Server: Test Lobby"));
        assert!(started.elapsed() < harness.context.config.send_timeout());
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_the_queue() {
        let (sender, receiver) = crate::messaging::event_channel(8);
        let handled = Arc::new(std::sync::Mutex::new(Vec::new()));

        let task = {
            let handled = Arc::clone(&handled);
            tokio::spawn(consume_isolated(receiver, move |event| {
                let handled = Arc::clone(&handled);
                async move {
                    if let ServerEvent::MessageReceived(message) = event {
                        if message.text == "explode" {
                            panic!("handler failure");
                        }
                        handled.lock().unwrap().push(message.text);
                    }
                }
            }))
        };

        for text in ["before", "explode", "after"] {
            sender
                .emit(ServerEvent::message(PlayerId(1), text.to_string()))
                .await
                .unwrap();
        }
        drop(sender);
        task.await.expect("consumer should survive the panic");

        assert_eq!(*handled.lock().unwrap(), ["before", "after"]);
    }
}
