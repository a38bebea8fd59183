//! Error types for the gateway client.

use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for gateway client operations
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Socket open, liveness probe, or send failure. The connection is
    /// closed; no retry is attempted by this layer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed frame or missing required fields. A single frame is
    /// dropped; the connection stays alive.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The gateway rejected the handshake.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The gateway rejected a request after the handshake.
    #[error("Request rejected by gateway: {0}")]
    Rejected(String),

    /// Attestation encoding or signing failure. Aborts locally before
    /// anything is sent.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Key storage failure.
    #[error("Key storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A newer request of the same kind replaced this one before it
    /// resolved (last-write-wins slot policy).
    #[error("Request superseded by a newer request of the same kind")]
    Superseded,

    /// A deadline elapsed before the awaited step completed.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The connection is closed; the exchange was abandoned.
    #[error("Connection closed")]
    Closed,
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Protocol(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}
