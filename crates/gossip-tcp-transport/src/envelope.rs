//! Wire envelopes
//!
//! An envelope carries exactly one of `digest` or `deltas` plus the sender
//! identity. The key present on the wire is the discriminator; inbound
//! documents are classified into [`Inbound`] right after parsing.

use crate::peer::{PeerIdentity, Sender};
use serde::Serialize;
use serde_json::Value;

/// Outbound envelope
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Digest { digest: Value, sender: PeerIdentity },
    Deltas { deltas: Value, sender: PeerIdentity },
}

impl Envelope {
    /// Digest envelope; only `id` and `transport` of `sender` are sent
    pub fn digest(sender: &PeerIdentity, digest: Value) -> Self {
        Self::Digest {
            digest,
            sender: sender.wire_identity(),
        }
    }

    /// Deltas envelope; only `id` and `transport` of `sender` are sent
    pub fn deltas(sender: &PeerIdentity, deltas: Value) -> Self {
        Self::Deltas {
            deltas,
            sender: sender.wire_identity(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A decoded inbound message
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Digest {
        sender: Option<Sender>,
        digest: Value,
    },
    Deltas {
        sender: Option<Sender>,
        deltas: Value,
    },
    /// Valid JSON carrying neither a truthy `digest` nor a truthy `deltas`
    Unrecognized,
}

impl Inbound {
    /// Parse and classify a complete message body
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let document: Value = serde_json::from_slice(bytes)?;
        Ok(Self::classify(document))
    }

    /// Classify a parsed document; `deltas` is checked before `digest`
    pub fn classify(document: Value) -> Self {
        let Value::Object(mut fields) = document else {
            return Self::Unrecognized;
        };

        let sender = fields.remove("sender").and_then(decode_sender);

        match (fields.remove("deltas"), fields.remove("digest")) {
            (Some(deltas), _) if is_truthy(&deltas) => Self::Deltas { sender, deltas },
            (_, Some(digest)) if is_truthy(&digest) => Self::Digest { sender, digest },
            _ => Self::Unrecognized,
        }
    }
}

/// A missing or `null` sender is `None`; anything else is kept
fn decode_sender(raw: Value) -> Option<Sender> {
    match raw {
        Value::Null => None,
        raw => Some(Sender::from_value(raw)),
    }
}

/// JavaScript truthiness: `null`, `false`, `0`, `NaN` and `""` are falsy
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerAddress;
    use serde_json::json;

    fn local_peer() -> PeerIdentity {
        PeerIdentity::new("local", PeerAddress::new("localhost", 9742))
    }

    #[test]
    fn test_digest_wire_shape() {
        let envelope = Envelope::digest(&local_peer(), json!([{"id": "a"}]));
        let wire: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({
                "digest": [{"id": "a"}],
                "sender": {"id": "local", "transport": {"host": "localhost", "port": 9742}}
            })
        );
    }

    #[test]
    fn test_deltas_wire_shape_strips_extra_sender_fields() {
        let sender = local_peer().with_field("maxVersionSeen", json!(4));
        let envelope = Envelope::deltas(&sender, json!([["local", "foo", "bar", 17]]));
        let wire: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(wire["deltas"], json!([["local", "foo", "bar", 17]]));
        assert_eq!(wire["sender"], json!({"id": "local", "transport": {"host": "localhost", "port": 9742}}));
        assert!(wire.get("digest").is_none());
    }

    #[test]
    fn test_sender_transport_is_sent_unchanged() {
        let mut transport = PeerAddress::new("localhost", 9742);
        transport.extra.insert("family".to_string(), json!("IPv4"));
        let sender = PeerIdentity::new("local", transport);

        let envelope = Envelope::digest(&sender, json!([1]));
        let wire: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            wire["sender"],
            json!({"id": "local", "transport": {"host": "localhost", "port": 9742, "family": "IPv4"}})
        );
    }

    #[test]
    fn test_classify_deltas() {
        let inbound = Inbound::from_slice(
            br#"{"deltas":[["remote","foo","bar",3]],"sender":{"id":"remote","transport":{"host":"127.0.0.1","port":11111}}}"#,
        )
        .unwrap();
        assert_eq!(
            inbound,
            Inbound::Deltas {
                sender: Some(PeerIdentity::new("remote", PeerAddress::new("127.0.0.1", 11111)).into()),
                deltas: json!([["remote", "foo", "bar", 3]]),
            }
        );
    }

    #[test]
    fn test_classify_deltas_wins_over_digest() {
        let inbound = Inbound::classify(json!({"digest": [1], "deltas": [2]}));
        assert_eq!(
            inbound,
            Inbound::Deltas {
                sender: None,
                deltas: json!([2]),
            }
        );
    }

    #[test]
    fn test_classify_falsy_deltas_falls_through_to_digest() {
        let inbound = Inbound::classify(json!({"deltas": 0, "digest": {"a": 1}}));
        assert!(matches!(inbound, Inbound::Digest { .. }));
    }

    #[test]
    fn test_classify_empty_array_is_truthy() {
        let inbound = Inbound::classify(json!({"digest": []}));
        assert_eq!(
            inbound,
            Inbound::Digest {
                sender: None,
                digest: json!([]),
            }
        );
    }

    #[test]
    fn test_classify_unrecognized() {
        assert_eq!(Inbound::classify(json!({"foo": "bar"})), Inbound::Unrecognized);
        assert_eq!(Inbound::classify(json!({"digest": null, "deltas": ""})), Inbound::Unrecognized);
        assert_eq!(Inbound::classify(json!([1, 2, 3])), Inbound::Unrecognized);
        assert_eq!(Inbound::classify(json!("digest")), Inbound::Unrecognized);
    }

    #[test]
    fn test_unexpected_sender_shape_is_kept_raw() {
        let inbound = Inbound::classify(json!({"digest": [1], "sender": "someone"}));
        assert_eq!(
            inbound,
            Inbound::Digest {
                sender: Some(Sender::Raw(json!("someone"))),
                digest: json!([1]),
            }
        );

        let raw = json!({"id": "r", "transport": {"host": "h", "port": "9742"}});
        let Inbound::Digest { sender: Some(sender), .. } =
            Inbound::classify(json!({"digest": [1], "sender": raw.clone()}))
        else {
            panic!("expected digest with sender");
        };
        assert_eq!(sender.to_value(), raw);
    }

    #[test]
    fn test_transport_extra_fields_are_kept() {
        let raw = json!({"id": "r", "transport": {"host": "h", "port": 1, "family": "IPv4"}});
        let Inbound::Digest { sender: Some(sender), .. } =
            Inbound::classify(json!({"digest": [1], "sender": raw.clone()}))
        else {
            panic!("expected digest with sender");
        };
        assert!(sender.identity().is_some());
        assert_eq!(sender.to_value(), raw);
    }

    #[test]
    fn test_null_sender_is_none() {
        let inbound = Inbound::classify(json!({"deltas": [1], "sender": null}));
        assert_eq!(
            inbound,
            Inbound::Deltas {
                sender: None,
                deltas: json!([1]),
            }
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(Inbound::from_slice(b"not json at all").is_err());
        assert!(Inbound::from_slice(b"").is_err());
    }

    #[test]
    fn test_trailing_crlf_is_accepted() {
        let inbound = Inbound::from_slice(b"{\"digest\":[1]}\r\n").unwrap();
        assert!(matches!(inbound, Inbound::Digest { .. }));
    }
}
