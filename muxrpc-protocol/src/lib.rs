//! # muxrpc-protocol
//!
//! Wire format for muxrpc.
//!
//! This crate provides:
//! - Message framing over a byte stream (length prefix and CRC32C validation)
//! - The leading discriminator byte that identifies a message's kind
//! - Remote RPC request/response frame encoding
//! - Protocol errors and constants

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{Frame, FrameFlags, FRAME_HEADER_SIZE, MAGIC};
pub use message::{
    MessageKind, RequestFrame, ResponseFrame, MSG_REMOTE_RPC_REQUEST, MSG_REMOTE_RPC_RESPONSE,
};

/// Framing version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default RPC port of a remote node.
pub const DEFAULT_PORT: u16 = 8001;

/// Maximum size of a single message (16 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;
