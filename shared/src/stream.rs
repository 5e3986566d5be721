//! Framed envelope I/O over async byte streams
//!
//! Shared by the bridge's operator sessions and the operator console.

use crate::codec::{self, CodecError, FrameDecoder};
use crate::Envelope;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads length-prefixed envelopes from a byte stream
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Read the next envelope.
    ///
    /// Returns `None` once the peer closes the connection. Cancel safe:
    /// partial frames stay buffered for the next call.
    pub async fn recv(&mut self) -> Result<Option<Envelope>, StreamError> {
        loop {
            if let Some(envelope) = self.decoder.decode_next()? {
                return Ok(Some(envelope));
            }

            let n = self.reader.read(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.decoder.extend(&self.read_buf[..n]);
        }
    }
}

/// Encode and write one envelope
pub async fn write_envelope<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
) -> Result<(), StreamError> {
    let encoded = codec::encode(envelope)?;
    writer.write_all(&encoded).await?;
    Ok(())
}
