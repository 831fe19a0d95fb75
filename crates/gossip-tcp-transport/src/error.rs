//! Error types for the gossip TCP transport

use crate::framing::FrameError;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias using our error
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect, write or shutdown failure on a socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Framing failure while reading or writing a message
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Payload could not be JSON-encoded
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Message was not completed within the configured read timeout
    #[error("timed out waiting for message")]
    Timeout,

    /// `start` was called while a listener is already bound
    #[error("already listening on {0}")]
    AlreadyListening(SocketAddr),
}
