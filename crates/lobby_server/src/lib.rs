//! # Lobby Server - Multiplayer Relay Core
//!
//! A small multiplayer relay/lobby server core. It accepts raw TCP client
//! connections, tracks connected players and ad-hoc game sessions, and
//! relays newline-delimited text commands between clients.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Player Registry** - Connected players keyed by id
//! * **Session Registry** - Sessions, their lifecycle and cancellable timers
//! * **Connection Manager** - Write halves of open sockets, unicast and broadcast
//! * **Connection Handler** - One task per socket, framing inbound lines
//! * **Event Dispatcher** - Single consumer of connection notifications
//! * **Command Processor** - `ready`, `unready`, `status`, `chat <message>`
//!
//! ### Message Flow
//!
//! 1. The acceptor assigns a player id, registers the write half and
//!    publishes `PlayerConnected`
//! 2. The handler splits inbound bytes into lines and publishes one
//!    `MessageReceived` per line, in order
//! 3. The dispatcher parses each line and updates the registries or
//!    answers through the connection manager
//! 4. When the stream ends the handler unregisters the connection and
//!    publishes `PlayerDisconnected`
//!
//! Notifications travel over a bounded channel, so a slow dispatcher applies
//! backpressure to connections instead of dropping their commands.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobby_server::{create_server, ShutdownState};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = create_server();
//! let shutdown = ShutdownState::new();
//! server.start(shutdown).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! * **Network errors** - a failed bind is returned from [`LobbyServer::start`]
//! * **Connection errors** - logged, treated as a disconnect, never fatal
//! * **Registry misses** - `None`/`false`, never errors
//! * **Faulting commands** - isolated per notification by the dispatcher

pub use config::ServerConfig;
pub use context::LobbyContext;
pub use error::{FramingError, ServerError};
pub use player::{Player, PlayerId, PlayerRegistry, PlayerState};
pub use server::LobbyServer;
pub use session::{Session, SessionId, SessionMember, SessionRegistry, SessionState};
pub use shutdown::ShutdownState;
pub use status::StatusSnapshot;
pub use utils::{create_server, create_server_with_config};

pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod messaging;
pub mod player;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod status;
pub mod utils;
