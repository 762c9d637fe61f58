//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Invalid pattern in {field}[{index}] '{pattern}': {message}")]
    InvalidPattern {
        field: String,
        index: usize,
        pattern: String,
        message: String,
    },
}

/// Transient network errors. These are recovered by reconnecting and are
/// never shown to chat users.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection timed out")]
    Timeout,

    #[error("TLS handshake with {host} failed: {message}")]
    Tls { host: String, message: String },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Server closed the link: {reason}")]
    ServerError { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credential failures. Never retried: the process exits with a diagnostic.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("SASL authentication failed ({numeric}): {message}")]
    SaslFailed { numeric: String, message: String },

    #[error("Server does not support SASL: {message}")]
    SaslUnavailable { message: String },

    #[error("Discord rejected the bot token")]
    InvalidToken,
}

/// Discord-related errors.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Failed to send message to channel {channel_id}: {source}")]
    SendFailed {
        channel_id: u64,
        #[source]
        source: serenity::Error,
    },

    #[error("Channel {channel_id} is not in a guild")]
    NotInGuild { channel_id: u64 },

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

/// Outcome of a session that stopped running.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<std::io::Error> for SessionError {
    fn from(error: std::io::Error) -> Self {
        Self::Connection(ConnectionError::Io(error))
    }
}

impl SessionError {
    /// Whether the session must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
