//! Inbound listener
//!
//! Accepts connections, frames exactly one message per connection and
//! raises a `digest` or `deltas` event for it. Anything that does not decode
//! into one of those is dropped without an event.

use crate::config::TransportConfig;
use crate::envelope::Inbound;
use crate::error::{Result, TransportError};
use crate::events::{EventBus, TransportEvent};
use crate::framing::EnvelopeCodec;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info};

/// First pause after a failed accept, doubled per consecutive failure
const ACCEPT_BACKOFF_INITIAL: Duration = Duration::from_millis(10);

/// Longest pause between accept attempts
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// A bound listening socket
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_message_bytes: usize,
    read_timeout: Option<Duration>,
    events: Arc<EventBus>,
}

/// Owner of a running accept loop
///
/// Dropping the handle without calling [`ListenerHandle::shutdown`] leaves
/// the accept loop running until the runtime shuts down.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl Listener {
    /// Bind per `config`, raise `Listening` and start accepting
    pub async fn bind(config: &TransportConfig, events: Arc<EventBus>) -> Result<ListenerHandle> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|source| TransportError::Bind {
                addr: format!("{}:{}", config.host, config.port),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let listener = Self {
            listener,
            local_addr,
            max_message_bytes: config.max_message_bytes,
            read_timeout: config.read_timeout,
            events,
        };

        listener.events.emit(&TransportEvent::Listening { addr: local_addr });
        let task = tokio::spawn(listener.run(shutdown_rx));

        Ok(ListenerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut failures = 0u32;
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            failures = 0;
                            debug!("Accepted connection from {}", addr);
                            let events = self.events.clone();
                            let max = self.max_message_bytes;
                            let read_timeout = self.read_timeout;
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, max, read_timeout, &events).await {
                                    debug!("Dropped message from {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            // e.g. EMFILE: accept fails again immediately until a descriptor frees up
                            failures = failures.saturating_add(1);
                            let pause = accept_backoff(failures);
                            error!("Accept error: {} (retrying in {:?})", e, pause);
                            tokio::select! {
                                _ = tokio::time::sleep(pause) => {}
                                _ = shutdown_rx.recv() => break,
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
        info!("Stopped listening on {}", self.local_addr);
    }
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the accept loop to stop without waiting for it
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Stop accepting and wait until the listening socket is released
    ///
    /// Connections that were already accepted still run to completion.
    pub async fn shutdown(self) {
        self.signal_shutdown();
        if let Err(e) = self.task.await {
            error!("Accept loop for {} failed: {}", self.local_addr, e);
        }
    }
}

/// Pause before the next accept after `failures` consecutive accept errors
fn accept_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_INITIAL
        .saturating_mul(1 << shift)
        .min(ACCEPT_BACKOFF_MAX)
}

/// Read one message from `stream` and dispatch it
async fn handle_connection(
    stream: TcpStream,
    max_message_bytes: usize,
    read_timeout: Option<Duration>,
    events: &EventBus,
) -> Result<()> {
    let mut framed = FramedRead::new(stream, EnvelopeCodec::with_max_message_bytes(max_message_bytes));

    let next = match read_timeout {
        Some(limit) => tokio::time::timeout(limit, framed.next())
            .await
            .map_err(|_| TransportError::Timeout)?,
        None => framed.next().await,
    };

    match next {
        Some(inbound) => dispatch(inbound?, events),
        None => debug!("Connection closed without a message"),
    }
    Ok(())
}

fn dispatch(inbound: Inbound, events: &EventBus) {
    match inbound {
        Inbound::Deltas { sender, deltas } => {
            events.emit(&TransportEvent::Deltas { sender, deltas });
        }
        Inbound::Digest { sender, digest } => {
            events.emit(&TransportEvent::Digest { sender, digest });
        }
        Inbound::Unrecognized => debug!("Ignoring message with neither digest nor deltas"),
    }
}
