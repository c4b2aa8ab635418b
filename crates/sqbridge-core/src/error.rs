//! Bridge-wide error types
//!
//! A single `thiserror` enum covers every failure the bridge can surface.
//! Which variants are fatal, dropped, or returned is decided by the caller:
//! connection failures end the session, decode failures on the push channel
//! are logged and dropped, and remote call failures are swallowed for
//! fire-and-forget commands but returned for queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bridge-wide error type
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum BridgeError {
    /// Push channel handshake failed or the connection dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed JSON or a payload that does not match the expected schema
    #[error("Decode error: {0}")]
    Decode(String),

    /// Push message with a `type` the bridge does not understand
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Network failure or non-success status on a command/query call
    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    /// Endpoint string could not be turned into push/command URLs
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Operation needs a live session
    #[error("Not connected")]
    NotConnected,

    /// `start` was called on a bridge that already ran a session
    #[error("Session already started")]
    AlreadyStarted,

    /// Handle names a scope the debuggee cannot be queried for
    #[error("Unknown variable scope: {0}")]
    UnknownVariableScope(String),

    /// Variable reference was never handed out by this session
    #[error("Unknown variable reference: {0}")]
    UnknownVariableReference(i64),

    /// IO error (source reads)
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BridgeError::RemoteCall("status 500".to_string()).to_string(),
            "Remote call failed: status 500"
        );
        assert_eq!(BridgeError::NotConnected.to_string(), "Not connected");
        assert_eq!(
            BridgeError::UnknownVariableReference(7).to_string(),
            "Unknown variable reference: 7"
        );
    }

    #[test]
    fn test_error_serialization() {
        let err = BridgeError::Decode("missing field `message`".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Decode\""));
        assert!(json.contains("missing field"));
    }

    #[test]
    fn test_from_serde_json() {
        let err: BridgeError = serde_json::from_str::<serde_json::Value>("{\"type\":")
            .unwrap_err()
            .into();
        assert!(matches!(err, BridgeError::Decode(_)));
    }
}
