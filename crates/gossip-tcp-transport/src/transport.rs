//! TCP transport facade
//!
//! Combines a listener, fire-and-forget senders and the event registry the
//! gossip layer subscribes to.

use crate::config::{ListenOptions, TransportConfig};
use crate::envelope::Envelope;
use crate::error::{Result, TransportError};
use crate::events::{EventBus, EventKind, SubscriptionId, TransportEvent};
use crate::listener::{Listener, ListenerHandle};
use crate::peer::{PeerAddress, PeerIdentity};
use crate::sender::{self, Payload};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// TCP transport for gossip digests and deltas
#[derive(Debug)]
pub struct TcpTransport {
    config: TransportConfig,
    events: Arc<EventBus>,
    server: Mutex<Option<ListenerHandle>>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl TcpTransport {
    /// Create a transport. No socket is opened until [`TcpTransport::start`].
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            events: Arc::new(EventBus::new()),
            server: Mutex::new(None),
        }
    }

    /// Create a transport and start listening
    pub async fn listen(config: TransportConfig) -> Result<Self> {
        let transport = Self::new(config);
        transport.start(None).await?;
        Ok(transport)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Start listening
    ///
    /// `options` override the constructor configuration for this call only.
    /// Returns once the socket is bound, after `Listening` has been raised.
    pub async fn start(&self, options: Option<ListenOptions>) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Err(TransportError::AlreadyListening(addr));
        }

        let config = match options {
            Some(options) => self.config.merged(&options),
            None => self.config.clone(),
        };
        let handle = Listener::bind(&config, self.events.clone()).await?;
        let addr = handle.local_addr();

        // A concurrent start may have won the slot while we were binding
        let rejected = {
            let mut slot = self.server.lock();
            match slot.as_ref() {
                Some(existing) => Some((existing.local_addr(), handle)),
                None => {
                    *slot = Some(handle);
                    None
                }
            }
        };
        if let Some((existing, handle)) = rejected {
            handle.shutdown().await;
            return Err(TransportError::AlreadyListening(existing));
        }

        Ok(addr)
    }

    /// Stop listening and wait until the socket is released
    ///
    /// Does nothing if the transport is not listening.
    pub async fn stop(&self) {
        let handle = self.server.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            self.events.emit(&TransportEvent::Closed);
        }
    }

    pub fn is_listening(&self) -> bool {
        self.server.lock().is_some()
    }

    /// Address the listener is bound to, if any
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(ListenerHandle::local_addr)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Subscribe to events of `kind`
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Send `payload` to `remote` over a dedicated connection
    ///
    /// Returns immediately. A failure is raised once as an `Error` event and
    /// not retried. Must be called from within a tokio runtime.
    pub fn send(&self, remote: impl AsRef<PeerAddress>, payload: impl Into<Payload>) {
        let remote = remote.as_ref().clone();
        let payload = payload.into();
        let events = self.events.clone();

        tokio::spawn(async move {
            if let Err(e) = sender::deliver(&remote, payload).await {
                debug!("Send to {} failed: {}", remote, e);
                events.emit(&TransportEvent::Error {
                    remote,
                    error: Arc::new(e),
                });
            }
        });
    }

    /// Send a digest to `remote`, identifying ourselves as `local`
    pub fn send_digest(&self, remote: impl AsRef<PeerAddress>, local: &PeerIdentity, digest: Value) {
        self.send(remote, Envelope::digest(local, digest));
    }

    /// Send deltas to `remote`, identifying ourselves as `local`
    pub fn send_deltas(&self, remote: impl AsRef<PeerAddress>, local: &PeerIdentity, deltas: Value) {
        self.send(remote, Envelope::deltas(local, deltas));
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.server.get_mut().take() {
            handle.signal_shutdown();
        }
    }
}
