//! gossip-tcpd - gossip TCP transport daemon
//!
//! Runs a listener that logs every digest and deltas it receives, or sends a
//! single envelope to a remote peer and exits.

mod config;

use clap::Parser;
use config::{Command, Config, SendArgs};
use gossip_tcp_transport::sender::deliver;
use gossip_tcp_transport::{Envelope, EventKind, TcpTransport, TransportEvent};
use serde_json::Value;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();
    init_logging(&config);

    info!(
        "gossip-tcpd v{} - gossip TCP transport",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_logging(config: &Config) {
    let level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gossip_tcpd={level},gossip_tcp_transport={level}")));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    match &config.command {
        Command::Listen => listen(&config).await,
        Command::Digest(args) => {
            let (local, digest) = prepare(&config, args)?;
            deliver(&args.to, Envelope::digest(&local, digest).into()).await?;
            info!("Sent digest to {}", args.to);
            Ok(())
        }
        Command::Deltas(args) => {
            let (local, deltas) = prepare(&config, args)?;
            deliver(&args.to, Envelope::deltas(&local, deltas).into()).await?;
            info!("Sent deltas to {}", args.to);
            Ok(())
        }
    }
}

fn prepare(
    config: &Config,
    args: &SendArgs,
) -> anyhow::Result<(gossip_tcp_transport::PeerIdentity, Value)> {
    let payload: Value = serde_json::from_str(&args.payload)
        .map_err(|e| anyhow::anyhow!("payload is not valid JSON: {}", e))?;
    Ok((config.local_peer(&args.id), payload))
}

async fn listen(config: &Config) -> anyhow::Result<()> {
    let transport = TcpTransport::new(config.transport_config());

    transport.on(EventKind::Digest, |event| {
        if let TransportEvent::Digest { sender, digest } = event {
            info!(
                sender = sender.as_ref().and_then(|s| s.id()).unwrap_or("<unknown>"),
                "digest: {}",
                digest
            );
        }
    });
    transport.on(EventKind::Deltas, |event| {
        if let TransportEvent::Deltas { sender, deltas } = event {
            info!(
                sender = sender.as_ref().and_then(|s| s.id()).unwrap_or("<unknown>"),
                "deltas: {}",
                deltas
            );
        }
    });

    let addr = transport.start(None).await?;
    info!("Ready on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    transport.stop().await;
    Ok(())
}
