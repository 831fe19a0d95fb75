//! Message framing for the TCP transport
//!
//! One message per connection. The receiver buffers everything until the
//! peer half-closes, then parses the whole buffer as a single JSON document.
//! The trailing `\r\n` written by senders is never used as a delimiter.

use crate::config::DEFAULT_MAX_MESSAGE_BYTES;
use crate::envelope::Inbound;
use crate::sender::Payload;
use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Written after every message body
pub const TERMINATOR: &[u8] = b"\r\n";

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Message too large: {0} bytes")]
    TooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Codec for end-of-stream framed JSON envelopes
#[derive(Clone, Debug)]
pub struct EnvelopeCodec {
    max_message_bytes: usize,
}

impl EnvelopeCodec {
    /// Create a codec with the default size limit
    pub fn new() -> Self {
        Self::with_max_message_bytes(DEFAULT_MAX_MESSAGE_BYTES)
    }

    /// Create a codec that rejects messages larger than `max` bytes
    pub fn with_max_message_bytes(max: usize) -> Self {
        Self {
            max_message_bytes: max,
        }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Inbound;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Nothing is complete until the stream ends
        if src.len() > self.max_message_bytes {
            return Err(FrameError::TooLarge(src.len()));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if src.len() > self.max_message_bytes {
            return Err(FrameError::TooLarge(src.len()));
        }

        let body = src.split();
        Ok(Some(Inbound::from_slice(&body)?))
    }
}

impl Encoder<Payload> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Payload, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.into_text()?;
        dst.reserve(body.len() + TERMINATOR.len());
        dst.put_slice(body.as_bytes());
        dst.put_slice(TERMINATOR);
        Ok(())
    }
}
