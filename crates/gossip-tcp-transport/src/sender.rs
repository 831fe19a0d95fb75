//! Outbound delivery: one connection per message

use crate::envelope::Envelope;
use crate::error::Result;
use crate::framing::{EnvelopeCodec, FrameError};
use crate::peer::PeerAddress;
use futures::SinkExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::FramedWrite;
use tracing::debug;

/// What gets written on the wire
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Already-encoded text, written as is
    Text(String),
    /// Arbitrary JSON value
    Json(Value),
    /// A digest or deltas envelope
    Envelope(Envelope),
}

impl Payload {
    /// Textual form of the payload, JSON-encoding anything that is not text
    pub fn into_text(self) -> std::result::Result<String, FrameError> {
        Ok(match self {
            Payload::Text(text) => text,
            Payload::Json(value) => serde_json::to_string(&value)?,
            Payload::Envelope(envelope) => envelope.to_json()?,
        })
    }
}

impl From<Envelope> for Payload {
    fn from(envelope: Envelope) -> Self {
        Payload::Envelope(envelope)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

/// Connect to `remote`, write `payload` and half-close
///
/// The half-close is what tells the receiver the message is complete.
pub async fn deliver(remote: &PeerAddress, payload: Payload) -> Result<()> {
    let stream = TcpStream::connect((remote.host.as_str(), remote.port)).await?;
    debug!("Connected to {}", remote);

    let mut framed = FramedWrite::new(stream, EnvelopeCodec::new());
    framed.send(payload).await?;

    let mut stream = framed.into_inner();
    stream.shutdown().await?;

    debug!("Delivered message to {}", remote);
    Ok(())
}
