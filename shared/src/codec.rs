//! Length-prefixed codec for operator links
//!
//! All frames are laid out as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: protobuf Envelope ]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::Envelope;

/// Maximum frame size (10 MB)
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Invalid message length prefix: {0}")]
    InvalidLength(u32),

    #[error("Protobuf decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Protobuf encode error: {0}")]
    EncodeError(#[from] prost::EncodeError),
}

/// Encode an Envelope into a length-prefixed frame
pub fn encode(envelope: &Envelope) -> Result<Bytes, CodecError> {
    let msg_len = envelope.encoded_len();
    if msg_len > MAX_MESSAGE_SIZE as usize {
        return Err(CodecError::MessageTooLarge(msg_len));
    }

    let mut buf = BytesMut::with_capacity(LEN_PREFIX + msg_len);
    buf.put_u32(msg_len as u32);
    envelope.encode(&mut buf)?;

    Ok(buf.freeze())
}

/// Try to take one frame off the front of `buf`
///
/// Returns `Ok(None)` and leaves `buf` untouched while the frame is incomplete.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
    if buf.len() < LEN_PREFIX {
        return Ok(None);
    }

    let msg_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if msg_len > MAX_MESSAGE_SIZE {
        return Err(CodecError::InvalidLength(msg_len));
    }

    if buf.len() < LEN_PREFIX + msg_len as usize {
        return Ok(None);
    }

    buf.advance(LEN_PREFIX);
    let msg_bytes = buf.split_to(msg_len as usize);

    Ok(Some(Envelope::decode(msg_bytes)?))
}

/// Accumulates stream reads and yields whole envelopes
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete envelope, if any
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next(&mut self) -> Result<Option<Envelope>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Bytes buffered but not yet decoded
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
