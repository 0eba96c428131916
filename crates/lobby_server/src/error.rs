//! Error types and handling for the lobby server.
//!
//! Registry misses are not errors: lookups on unknown players or sessions
//! come back as `None`/`false`. The types here cover the failures that
//! actually leave the server or a connection unable to continue.

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related and internal server errors
/// to help with debugging and error handling.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or socket I/O issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors such as a closed notification channel
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors produced while splitting the inbound byte stream into lines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// A line grew past the configured limit without a terminating newline
    #[error("line exceeds {limit} bytes without a newline")]
    LineTooLong { limit: usize },
}
