//! Gateway client error types.

use gatelink_identity::IdentityError;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the gateway client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No transport is open; the request was not sent.
    #[error("gateway not connected")]
    NotConnected,

    /// The client was stopped.
    #[error("gateway client stopped")]
    Stopped,

    /// The connection carrying a pending request closed.
    #[error("gateway closed ({code}): {reason}")]
    ConnectionLost { code: u16, reason: String },

    /// The server answered with `ok: false`.
    #[error("{message}")]
    Rpc {
        code: String,
        message: String,
        details: Option<Value>,
    },

    /// The handshake could not be completed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Device identity failure.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the server explicitly rejected the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }

    /// Whether the error came from losing the connection rather than from the
    /// server or the caller.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. } | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(ClientError::NotConnected.to_string(), "gateway not connected");
        assert_eq!(
            ClientError::ConnectionLost {
                code: 4400,
                reason: "bye".into()
            }
            .to_string(),
            "gateway closed (4400): bye"
        );
        let rpc = ClientError::Rpc {
            code: "NOT_FOUND".into(),
            message: "unknown method".into(),
            details: None,
        };
        assert_eq!(rpc.to_string(), "unknown method");
        assert!(rpc.is_rejection());
        assert!(!rpc.is_connection_loss());
    }
}
