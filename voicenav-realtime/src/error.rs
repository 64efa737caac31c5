//! Error types for realtime sessions.

use thiserror::Error;

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors that can occur during a realtime voice session.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// Microphone access was declined or no input device exists.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// The remote endpoint refused, dropped, or errored mid-session.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Malformed audio payload from the remote. The offending chunk is
    /// skipped; the session continues.
    #[error("playback decode error: {0}")]
    PlaybackDecode(String),

    /// Operation attempted without an open session.
    #[error("session not connected")]
    NotConnected,

    /// Session already closed.
    #[error("session already closed")]
    SessionClosed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RealtimeError {
    /// Create a new permission-denied error.
    pub fn permission<S: Into<String>>(msg: S) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a new connection error.
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Create a new playback decode error.
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::PlaybackDecode(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this condition should surface a retry action to the user
    /// (as opposed to being logged and skipped).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::ConnectionFailed(_))
    }
}
