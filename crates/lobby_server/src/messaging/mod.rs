//! Notifications from connections and their handling.
//!
//! Connection handlers publish [`ServerEvent`]s into a bounded channel; a
//! single [`EventDispatcher`] consumes them in order, updates the registries
//! and answers clients.

pub mod commands;
pub mod dispatcher;
pub mod events;

pub use commands::Command;
pub use dispatcher::EventDispatcher;
pub use events::{
    event_channel, DisconnectReason, EventSender, MessageReceivedEvent, PlayerConnectedEvent,
    PlayerDisconnectedEvent, ServerEvent,
};
