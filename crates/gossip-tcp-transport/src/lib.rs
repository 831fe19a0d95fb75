//! TCP transport for gossip peers
//!
//! This crate provides:
//! - A listener that decodes one JSON envelope per inbound connection
//! - A sender that writes one envelope per outbound connection
//! - An event registry raising `digest`, `deltas` and `error` events
//!
//! Wire format: a single JSON document (`{"digest":…,"sender":…}` or
//! `{"deltas":…,"sender":…}`) followed by `\r\n`. The sender half-closes the
//! connection to mark the end of the message.

pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod framing;
pub mod listener;
pub mod peer;
pub mod sender;
pub mod transport;

pub use config::{ListenOptions, TransportConfig};
pub use envelope::{Envelope, Inbound};
pub use error::{Result, TransportError};
pub use events::{EventBus, EventKind, SubscriptionId, TransportEvent};
pub use framing::{EnvelopeCodec, FrameError};
pub use listener::{Listener, ListenerHandle};
pub use peer::{AddressParseError, PeerAddress, PeerIdentity, Sender};
pub use sender::Payload;
pub use transport::TcpTransport;
