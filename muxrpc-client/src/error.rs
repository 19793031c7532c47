//! Client error types.

use muxrpc_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("RPC call {id} timed out after {after:?}")]
    Timeout { id: u64, after: Duration },

    /// The remote node answered the call with an error. The payload is the
    /// remote message, verbatim.
    #[error("{0}")]
    Remote(String),

    #[error("failed to encode call arguments: {0}")]
    EncodeArgs(serde_json::Error),

    #[error("failed to decode call result: {0}")]
    DecodeResult(serde_json::Error),

    #[error("call id {0} is already pending")]
    DuplicateCallId(u64),

    #[error("background task aborted: {0}")]
    TaskAborted(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

impl ClientError {
    /// Returns whether issuing the same call again might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout { .. } | ClientError::ConnectionClosed
        )
    }

    /// Returns whether this error ended the whole connection rather than a
    /// single call.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            ClientError::Io(_) | ClientError::ConnectionClosed | ClientError::NotConnected => true,
            ClientError::Protocol(e) => e.is_framing(),
            _ => false,
        }
    }
}
