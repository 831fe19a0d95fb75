//! Transport configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listen host
pub const DEFAULT_HOST: &str = "localhost";

/// Default listen port
pub const DEFAULT_PORT: u16 = 9742;

/// Maximum inbound message size (16 MB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Listener configuration
///
/// Construction performs no I/O. A port of `0` binds an ephemeral port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Hostname or IP to listen on
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Inbound connections buffering more than this are dropped
    pub max_message_bytes: usize,
    /// Inbound connections that do not finish their message in time are dropped
    #[serde(with = "opt_secs")]
    pub read_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            read_timeout: None,
        }
    }
}

impl TransportConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Configuration for a single `start` call: unset options fall back to ours
    pub fn merged(&self, options: &ListenOptions) -> Self {
        Self {
            host: options.host.clone().unwrap_or_else(|| self.host.clone()),
            port: options.port.unwrap_or(self.port),
            ..self.clone()
        }
    }

    /// `host:port` as handed to the resolver
    pub fn bind_target(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

/// Per-call overrides for `start`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ListenOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
        }
    }
}

impl From<ListenOptions> for TransportConfig {
    fn from(options: ListenOptions) -> Self {
        TransportConfig::default().merged(&options)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        secs.map(|s| {
            Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9742);
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn test_partial_options_fill_defaults() {
        let config: TransportConfig = ListenOptions {
            host: None,
            port: Some(6744),
        }
        .into();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6744);
    }

    #[test]
    fn test_call_options_take_precedence() {
        let config = TransportConfig::default()
            .with_host("127.0.0.1")
            .with_port(6744)
            .with_max_message_bytes(1024);

        let merged = config.merged(&ListenOptions {
            host: None,
            port: Some(6745),
        });
        assert_eq!(merged.host, "127.0.0.1");
        assert_eq!(merged.port, 6745);
        assert_eq!(merged.max_message_bytes, 1024);

        // The stored config is untouched
        assert_eq!(config.port, 6744);
    }

    #[test]
    fn test_deserialize_partial_document() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"port": 7000, "read_timeout": 2.5}"#).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 7000);
        assert_eq!(config.read_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.max_message_bytes, DEFAULT_MAX_MESSAGE_BYTES);
    }
}
