//! Remote RPC request and response messages.
//!
//! Every message starts with a discriminator byte. This crate only defines the
//! two remote-control RPC kinds; any other value belongs to some other
//! subsystem sharing the connection and is passed through untouched.
//!
//! ```text
//! request:  0xB0 | id u64 | method_len u16 | method | args_len u32 | args
//! response: 0xB1 | id u64 | is_error u8    | result_len u32 | result
//! ```
//!
//! All integers are big-endian.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;

/// Discriminator of a remote RPC request.
pub const MSG_REMOTE_RPC_REQUEST: u8 = 0xB0;

/// Discriminator of a remote RPC response.
pub const MSG_REMOTE_RPC_RESPONSE: u8 = 0xB1;

/// Kind of a message, read from its leading byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    RemoteRpcRequest,
    RemoteRpcResponse,
    /// Any message kind handled outside the RPC layer.
    Other(u8),
}

impl MessageKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            MSG_REMOTE_RPC_REQUEST => MessageKind::RemoteRpcRequest,
            MSG_REMOTE_RPC_RESPONSE => MessageKind::RemoteRpcResponse,
            other => MessageKind::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            MessageKind::RemoteRpcRequest => MSG_REMOTE_RPC_REQUEST,
            MessageKind::RemoteRpcResponse => MSG_REMOTE_RPC_RESPONSE,
            MessageKind::Other(byte) => *byte,
        }
    }

    /// Reads the kind of a whole message.
    pub fn of(message: &[u8]) -> Result<Self, ProtocolError> {
        message
            .first()
            .map(|b| Self::from_byte(*b))
            .ok_or(ProtocolError::EmptyMessage)
    }
}

/// A remote RPC request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Call identifier, echoed back in the response.
    pub id: u64,
    /// Service-qualified method name, e.g. `LitRPC.Balance`.
    pub method: String,
    /// Serialized arguments (a JSON document).
    pub args: Bytes,
}

impl RequestFrame {
    pub fn new(id: u64, method: impl Into<String>, args: impl Into<Bytes>) -> Self {
        Self {
            id,
            method: method.into(),
            args: args.into(),
        }
    }

    /// Encodes the request into a message, discriminator included.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let method = self.method.as_bytes();
        let method_len =
            u16::try_from(method.len()).map_err(|_| ProtocolError::MethodTooLong(method.len()))?;

        let mut buf = BytesMut::with_capacity(1 + 8 + 2 + method.len() + 4 + self.args.len());
        buf.put_u8(MSG_REMOTE_RPC_REQUEST);
        buf.put_u64(self.id);
        buf.put_u16(method_len);
        buf.put_slice(method);
        put_len_prefixed(&mut buf, &self.args)?;

        Ok(buf.freeze())
    }

    /// Decodes a request message, discriminator included.
    pub fn decode(message: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = expect_kind(message, MSG_REMOTE_RPC_REQUEST)?;

        let id = get_u64(&mut buf, "id")?;

        ensure(&buf, 2, "method length")?;
        let method_len = buf.get_u16() as usize;
        ensure(&buf, method_len, "method")?;
        let method = std::str::from_utf8(&buf[..method_len])
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_string();
        buf.advance(method_len);

        let args = get_len_prefixed(&mut buf, "args")?;
        ensure_consumed(&buf)?;

        Ok(Self { id, method, args })
    }
}

/// A remote RPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Identifier of the request this answers.
    pub id: u64,
    /// Whether `result` carries an error message instead of a result.
    pub is_error: bool,
    /// JSON result on success, human-readable message bytes on error.
    pub result: Bytes,
}

impl ResponseFrame {
    pub fn ok(id: u64, result: impl Into<Bytes>) -> Self {
        Self {
            id,
            is_error: false,
            result: result.into(),
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            id,
            is_error: true,
            result: Bytes::from(message),
        }
    }

    /// The result interpreted as an error message.
    pub fn error_message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.result)
    }

    /// Encodes the response into a message, discriminator included.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(1 + 8 + 1 + 4 + self.result.len());
        buf.put_u8(MSG_REMOTE_RPC_RESPONSE);
        buf.put_u64(self.id);
        buf.put_u8(self.is_error as u8);
        put_len_prefixed(&mut buf, &self.result)?;

        Ok(buf.freeze())
    }

    /// Decodes a response message, discriminator included.
    pub fn decode(message: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = expect_kind(message, MSG_REMOTE_RPC_RESPONSE)?;

        let id = get_u64(&mut buf, "id")?;

        ensure(&buf, 1, "error flag")?;
        let is_error = match buf.get_u8() {
            0 => false,
            1 => true,
            other => return Err(ProtocolError::InvalidErrorFlag(other)),
        };

        let result = get_len_prefixed(&mut buf, "result")?;
        ensure_consumed(&buf)?;

        Ok(Self {
            id,
            is_error,
            result,
        })
    }
}

fn expect_kind(message: &[u8], expected: u8) -> Result<&[u8], ProtocolError> {
    let (&actual, body) = message.split_first().ok_or(ProtocolError::EmptyMessage)?;
    if actual != expected {
        return Err(ProtocolError::UnexpectedMessageType { expected, actual });
    }
    Ok(body)
}

fn ensure(buf: &[u8], needed: usize, field: &'static str) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated(field));
    }
    Ok(())
}

fn ensure_consumed(buf: &[u8]) -> Result<(), ProtocolError> {
    if buf.has_remaining() {
        return Err(ProtocolError::TrailingBytes(buf.remaining()));
    }
    Ok(())
}

fn get_u64(buf: &mut &[u8], field: &'static str) -> Result<u64, ProtocolError> {
    ensure(buf, 8, field)?;
    Ok(buf.get_u64())
}

fn get_len_prefixed(buf: &mut &[u8], field: &'static str) -> Result<Bytes, ProtocolError> {
    ensure(buf, 4, field)?;
    let len = buf.get_u32() as usize;
    ensure(buf, len, field)?;
    Ok(buf.copy_to_bytes(len))
}

fn put_len_prefixed(buf: &mut BytesMut, data: &[u8]) -> Result<(), ProtocolError> {
    let len = u32::try_from(data.len()).map_err(|_| ProtocolError::MessageTooLarge {
        size: data.len() as u64,
        max: crate::MAX_MESSAGE_SIZE,
    })?;
    buf.put_u32(len);
    buf.put_slice(data);
    Ok(())
}
