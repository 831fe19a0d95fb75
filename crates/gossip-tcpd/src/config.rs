//! Configuration for gossip-tcpd

use clap::{Parser, Subcommand};
use gossip_tcp_transport::{PeerAddress, PeerIdentity, TransportConfig};
use std::time::Duration;

/// gossip-tcpd - gossip digest/deltas TCP transport
#[derive(Parser, Debug, Clone)]
#[command(name = "gossip-tcpd")]
#[command(about = "Listen for or send gossip digests and deltas over TCP")]
pub struct Config {
    /// Host to listen on, and advertised as our transport host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to listen on, and advertised as our transport port
    #[arg(short, long, default_value = "9742")]
    pub port: u16,

    /// Drop inbound messages larger than this many bytes
    #[arg(long, default_value = "16777216")]
    pub max_message_bytes: usize,

    /// Drop inbound connections that take longer than this to deliver a message
    #[arg(long)]
    pub read_timeout_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Listen and log every digest and deltas received
    Listen,
    /// Send one digest to a peer
    Digest(SendArgs),
    /// Send one deltas message to a peer
    Deltas(SendArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct SendArgs {
    /// Remote peer as host:port
    #[arg(long)]
    pub to: PeerAddress,

    /// Our peer id
    #[arg(long, default_value = "gossip-tcpd")]
    pub id: String,

    /// JSON payload
    pub payload: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            anyhow::bail!("Host cannot be empty");
        }
        if self.max_message_bytes == 0 {
            anyhow::bail!("Max message bytes must be positive");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Log format must be json or pretty, got {}", self.log_format);
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        let config = TransportConfig::default()
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_max_message_bytes(self.max_message_bytes);
        match self.read_timeout_secs {
            Some(secs) => config.with_read_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    /// Identity we put in the `sender` field
    pub fn local_peer(&self, id: &str) -> PeerIdentity {
        PeerIdentity::new(id, PeerAddress::new(self.host.clone(), self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen() {
        let config = Config::parse_from(["gossip-tcpd", "--port", "6744", "listen"]);
        config.validate().unwrap();
        assert!(matches!(config.command, Command::Listen));

        let transport = config.transport_config();
        assert_eq!(transport.host, "localhost");
        assert_eq!(transport.port, 6744);
        assert_eq!(transport.read_timeout, None);
    }

    #[test]
    fn test_parse_send() {
        let config = Config::parse_from([
            "gossip-tcpd",
            "--read-timeout-secs",
            "5",
            "deltas",
            "--to",
            "127.0.0.1:11234",
            "--id",
            "local",
            r#"[["local","foo","bar",17]]"#,
        ]);
        assert_eq!(config.transport_config().read_timeout, Some(Duration::from_secs(5)));

        let Command::Deltas(args) = &config.command else {
            panic!("expected deltas command");
        };
        assert_eq!(args.to, PeerAddress::new("127.0.0.1", 11234));
        assert_eq!(config.local_peer(&args.id).transport.port, 9742);
    }

    #[test]
    fn test_validate_log_format() {
        let config = Config::parse_from(["gossip-tcpd", "--log-format", "xml", "listen"]);
        assert!(config.validate().is_err());
    }
}
