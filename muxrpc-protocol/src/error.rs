//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing, encoding, or decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected 'MUXR', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u64, max: u32 },

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("invalid frame flags: {0:#x}")]
    InvalidFlags(u16),

    #[error("empty message")]
    EmptyMessage,

    #[error("unexpected message type: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedMessageType { expected: u8, actual: u8 },

    #[error("message truncated while reading {0}")]
    Truncated(&'static str),

    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),

    #[error("invalid error flag: {0}")]
    InvalidErrorFlag(u8),

    #[error("method name too long: {0} bytes (max 65535)")]
    MethodTooLong(usize),

    #[error("invalid UTF-8 in method name")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether the byte stream can no longer be trusted after this error.
    ///
    /// Framing errors leave the decoder at an unknown offset, so every following
    /// message is suspect. Body errors only concern one message.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidMagic(_)
                | ProtocolError::UnsupportedVersion(_)
                | ProtocolError::MessageTooLarge { .. }
                | ProtocolError::CrcMismatch { .. }
                | ProtocolError::InvalidFlags(_)
                | ProtocolError::Io(_)
        )
    }
}
