//! Peer identity and addressing

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Network location of a peer's transport endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    /// Hostname or IP
    pub host: String,
    /// Port number
    pub port: u16,
    /// Opaque fields owned by the gossip layer
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            extra: Map::new(),
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// `host:port` could not be parsed
#[derive(Debug, Error)]
#[error("invalid peer address {0:?}, expected host:port")]
pub struct AddressParseError(String);

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = port.parse().map_err(|_| AddressParseError(s.to_string()))?;
        if host.is_empty() {
            return Err(AddressParseError(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

impl AsRef<PeerAddress> for PeerAddress {
    fn as_ref(&self) -> &PeerAddress {
        self
    }
}

/// Identity of a peer as carried in the `sender` field of an envelope
///
/// Only `id` and `transport` are interpreted. Any other fields a remote
/// peer attaches are kept in `extra` and serialized back unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Peer identifier
    pub id: String,
    /// Where the peer listens
    pub transport: PeerAddress,
    /// Opaque fields owned by the gossip layer
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PeerIdentity {
    /// Create an identity with no extra fields
    pub fn new(id: impl Into<String>, transport: PeerAddress) -> Self {
        Self {
            id: id.into(),
            transport,
            extra: Map::new(),
        }
    }

    /// Attach an opaque field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The identity as placed on the wire by a sender: `id` and `transport` only,
    /// with `transport` passed through unchanged
    pub fn wire_identity(&self) -> Self {
        Self::new(self.id.clone(), self.transport.clone())
    }
}

impl AsRef<PeerAddress> for PeerIdentity {
    fn as_ref(&self) -> &PeerAddress {
        &self.transport
    }
}

/// The `sender` of an inbound envelope
///
/// Senders shaped like a [`PeerIdentity`] are decoded into one. Anything else
/// is kept as the raw JSON value so no sender data is lost.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Sender {
    Identified(PeerIdentity),
    Raw(Value),
}

impl Sender {
    /// Decode a raw `sender` field
    pub fn from_value(raw: Value) -> Self {
        match PeerIdentity::deserialize(&raw) {
            Ok(identity) => Sender::Identified(identity),
            Err(_) => Sender::Raw(raw),
        }
    }

    pub fn identity(&self) -> Option<&PeerIdentity> {
        match self {
            Sender::Identified(identity) => Some(identity),
            Sender::Raw(_) => None,
        }
    }

    /// The sender's `id`, also when the rest of the identity did not decode
    pub fn id(&self) -> Option<&str> {
        match self {
            Sender::Identified(identity) => Some(identity.id.as_str()),
            Sender::Raw(raw) => raw.get("id").and_then(Value::as_str),
        }
    }

    /// The sender exactly as it appeared on the wire
    pub fn to_value(&self) -> Value {
        match self {
            Sender::Identified(identity) => serde_json::to_value(identity).unwrap_or(Value::Null),
            Sender::Raw(raw) => raw.clone(),
        }
    }
}

impl From<PeerIdentity> for Sender {
    fn from(identity: PeerIdentity) -> Self {
        Sender::Identified(identity)
    }
}
