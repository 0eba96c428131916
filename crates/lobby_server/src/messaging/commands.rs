//! Client command parsing and the fixed reply texts.
//!
//! Commands are whitespace-separated; the first token names the command and
//! is matched case-insensitively.

use crate::player::PlayerId;

pub const HELP_MESSAGE: &str =
    "Unknown command. Available commands: ready, unready, status, chat <message>";
pub const READY_CONFIRMATION: &str = "You are now ready.";
pub const UNREADY_CONFIRMATION: &str = "You are no longer ready.";
pub const SERVER_FULL_MESSAGE: &str = "Server is full, try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ready,
    Unready,
    Status,
    /// Chat text, re-joined with single spaces
    Chat(String),
    /// Anything else, carrying the original command token
    Unknown(String),
}

impl Command {
    /// Parses one command line. Returns `None` for a line with no tokens.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next()?;

        let command = match name.to_lowercase().as_str() {
            "ready" => Command::Ready,
            "unready" => Command::Unready,
            "status" => Command::Status,
            "chat" => Command::Chat(tokens.collect::<Vec<_>>().join(" ")),
            _ => Command::Unknown(name.to_string()),
        };
        Some(command)
    }
}

pub fn welcome_message(server_name: &str, display_name: &str, player_id: PlayerId) -> String {
    format!("Welcome to {server_name}, {display_name}! Your player id is {player_id}.")
}

pub fn join_announcement(display_name: &str) -> String {
    format!("{display_name} joined the lobby.")
}

pub fn leave_announcement(display_name: &str) -> String {
    format!("{display_name} left the lobby.")
}

pub fn chat_line(display_name: &str, text: &str) -> String {
    format!("{display_name}: {text}")
}
