//! Encoder and decoder for framed messages.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::{RequestFrame, ResponseFrame};
use bytes::{Bytes, BytesMut};

/// Encodes messages into frames ready to be written to a stream.
pub struct Encoder;

impl Encoder {
    /// Encodes a request into a frame.
    pub fn encode_request(request: &RequestFrame) -> Result<BytesMut, ProtocolError> {
        Frame::new(request.encode()?).encode()
    }

    /// Encodes a response into a frame.
    pub fn encode_response(response: &ResponseFrame) -> Result<BytesMut, ProtocolError> {
        Frame::new(response.encode()?).encode()
    }

    /// Frames an arbitrary message. The first byte should be its discriminator.
    pub fn encode_message(message: impl Into<Bytes>) -> Result<BytesMut, ProtocolError> {
        Frame::new(message).encode()
    }
}

/// Reassembles frames from stream reads and yields one message per frame.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Attempts to decode the next message from the buffer.
    pub fn decode_message(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        Ok(self.decode_frame()?.map(|frame| frame.message))
    }

    /// Attempts to decode the next message as a request.
    pub fn decode_request(&mut self) -> Result<Option<RequestFrame>, ProtocolError> {
        match self.decode_message()? {
            Some(message) => RequestFrame::decode(&message).map(Some),
            None => Ok(None),
        }
    }

    /// Attempts to decode the next message as a response.
    pub fn decode_response(&mut self) -> Result<Option<ResponseFrame>, ProtocolError> {
        match self.decode_message()? {
            Some(message) => ResponseFrame::decode(&message).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
