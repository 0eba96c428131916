//! Connection management for client sockets.
//!
//! This module tracks the write side of every open connection, keyed by the
//! player id the acceptor assigned, and splits the inbound byte stream into
//! command lines.

pub mod client;
pub mod framing;
pub mod manager;

pub use client::{ClientConnection, CloseSignal, ConnectionWriter};
pub use framing::LineFramer;
pub use manager::ConnectionManager;
