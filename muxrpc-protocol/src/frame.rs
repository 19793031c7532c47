//! Message framing over a byte stream.
//!
//! A transport read must yield exactly one logical message, so every message
//! is wrapped in a frame (16 bytes header + message):
//!
//! ```text
//! +--------+---------+--------+-------------+--------+
//! | magic  | version | flags  | message_len | crc32c |
//! | 4 bytes| 2 bytes |2 bytes |   4 bytes   | 4 bytes|
//! +--------+---------+--------+-------------+--------+
//! | message (first byte is the discriminator)        |
//! | message_len bytes                                |
//! +--------------------------------------------------+
//! ```

use crate::error::ProtocolError;
use crate::MAX_MESSAGE_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic bytes identifying muxrpc frames: "MUXR"
pub const MAGIC: [u8; 4] = *b"MUXR";

/// Size of the fixed frame header in bytes (4+2+2+4+4 = 16).
pub const FRAME_HEADER_SIZE: usize = 16;

/// Frame flags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u16);

impl FrameFlags {
    /// CRC32C checksum is present and valid.
    pub const CRC_PRESENT: u16 = 1 << 0;

    /// Valid flags mask for protocol version 1.
    const VALID_V1_MASK: u16 = 0x0001;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_crc(mut self) -> Self {
        self.0 |= Self::CRC_PRESENT;
        self
    }

    pub fn has_crc(&self) -> bool {
        self.0 & Self::CRC_PRESENT != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Result<Self, ProtocolError> {
        if bits & !Self::VALID_V1_MASK != 0 {
            return Err(ProtocolError::InvalidFlags(bits));
        }
        Ok(Self(bits))
    }
}

/// A single framed message.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Protocol version.
    pub version: u16,
    /// Frame flags.
    pub flags: FrameFlags,
    /// The message, starting with its discriminator byte.
    pub message: Bytes,
}

impl Frame {
    /// Creates a new CRC-protected frame around the given message.
    pub fn new(message: impl Into<Bytes>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            flags: FrameFlags::new().with_crc(),
            message: message.into(),
        }
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        if self.message.len() as u64 > MAX_MESSAGE_SIZE as u64 {
            return Err(ProtocolError::MessageTooLarge {
                size: self.message.len() as u64,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.message.len());

        buf.put_slice(&MAGIC);
        buf.put_u16(self.version);
        buf.put_u16(self.flags.bits());
        buf.put_u32(self.message.len() as u32);

        let crc = if self.flags.has_crc() {
            crc32c::crc32c(&self.message)
        } else {
            0
        };
        buf.put_u32(crc);

        buf.put_slice(&self.message);

        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// Nothing is consumed unless a whole frame is available.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let version = u16::from_be_bytes([buf[4], buf[5]]);
        if version != crate::PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let flags = FrameFlags::from_bits(u16::from_be_bytes([buf[6], buf[7]]))?;

        let message_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        if message_len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: message_len as u64,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let message_len = message_len as usize;

        let crc_expected = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);

        if buf.len() < FRAME_HEADER_SIZE + message_len {
            buf.reserve(FRAME_HEADER_SIZE + message_len - buf.len());
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let message = buf.split_to(message_len).freeze();

        if flags.has_crc() {
            let crc_actual = crc32c::crc32c(&message);
            if crc_actual != crc_expected {
                return Err(ProtocolError::CrcMismatch {
                    expected: crc_expected,
                    actual: crc_actual,
                });
            }
        }

        Ok(Some(Self {
            version,
            flags,
            message,
        }))
    }
}
