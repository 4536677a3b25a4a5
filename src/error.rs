//! Error types for relaychat.

use thiserror::Error;

/// Common error type for relaychat.
#[derive(Error, Debug)]
pub enum RelayChatError {
    /// Malformed protocol input (bad envelope, bad line pattern).
    ///
    /// Protocol errors are contained at the connection or line boundary:
    /// the offending input is dropped and the connection survives.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level failure (connect, handshake, mid-stream close).
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error on the chat transport.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for relaychat operations.
pub type Result<T> = std::result::Result<T, RelayChatError>;
