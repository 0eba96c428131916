//! Core server implementation and connection handling.
//!
//! This module contains the main lobby server structure, its accept loop,
//! and the per-connection reader loop.

pub mod core;
pub mod handlers;

pub use core::LobbyServer;
