use thiserror::Error;

use super::auth::AuthError;

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Failures raised by a bus transport regardless of the wire protocol.
#[derive(Debug, Error)]
pub enum BusError {
    /// The WebSocket connection could not be established.
    #[error("failed to connect to `{url}`")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    /// The router ended the opening handshake unexpectedly.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The router refused the session.
    #[error("session aborted by router: {reason}")]
    Aborted { reason: String },
    /// Challenge could not be answered.
    #[error("authentication failed")]
    Auth(#[from] AuthError),
    /// A frame did not follow the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The remote side answered a request with an error.
    #[error("remote error `{error}`")]
    Remote { error: String, args: Vec<serde_json::Value> },
    /// The transport is closed; no further requests can be served.
    #[error("bus connection closed")]
    Closed,
    /// Outgoing frame could not be encoded.
    #[error("failed to encode frame")]
    Encode(#[source] serde_json::Error),
}

impl BusError {
    /// Build a remote error carrying only the error URI.
    pub fn remote(error: impl Into<String>) -> Self {
        BusError::Remote {
            error: error.into(),
            args: Vec::new(),
        }
    }
}
