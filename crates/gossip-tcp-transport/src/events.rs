//! Event registry
//!
//! Subscribers register a handler for one [`EventKind`] and receive every
//! matching [`TransportEvent`] the transport raises.

use crate::error::TransportError;
use crate::peer::{PeerAddress, Sender};
use parking_lot::RwLock;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Event raised by the transport
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// The listener is bound and accepting connections
    Listening { addr: SocketAddr },
    /// A digest envelope was received
    Digest {
        sender: Option<Sender>,
        digest: Value,
    },
    /// A deltas envelope was received
    Deltas {
        sender: Option<Sender>,
        deltas: Value,
    },
    /// An outbound send failed
    Error {
        remote: PeerAddress,
        error: Arc<TransportError>,
    },
    /// The listener socket has been released
    Closed,
}

/// Event names subscribers register for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Listening,
    Digest,
    Deltas,
    Error,
    Closed,
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::Listening { .. } => EventKind::Listening,
            TransportEvent::Digest { .. } => EventKind::Digest,
            TransportEvent::Deltas { .. } => EventKind::Deltas,
            TransportEvent::Error { .. } => EventKind::Error,
            TransportEvent::Closed => EventKind::Closed,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Whether a subscription wants further events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Keep,
    Unsubscribe,
}

type Handler = Arc<dyn Fn(&TransportEvent) -> Delivery + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

/// Registry of event handlers
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.register(
            kind,
            Arc::new(move |event: &TransportEvent| {
                handler(event);
                Delivery::Keep
            }),
        )
    }

    /// Subscribe and receive matching events on a channel
    ///
    /// The subscription is removed by the first event dispatched after the
    /// receiver has been dropped.
    pub fn channel(&self, kind: EventKind) -> (SubscriptionId, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register(
            kind,
            Arc::new(move |event: &TransportEvent| match tx.send(event.clone()) {
                Ok(()) => Delivery::Keep,
                Err(_) => Delivery::Unsubscribe,
            }),
        );
        (id, rx)
    }

    fn register(&self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription { id, kind, handler });
        id
    }

    /// Remove one subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Remove every subscription for `kind`
    pub fn unsubscribe_all(&self, kind: EventKind) -> usize {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.kind != kind);
        before - subscriptions.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Dispatch `event` to its subscribers. Returns whether anyone received it.
    pub(crate) fn emit(&self, event: &TransportEvent) -> bool {
        let kind = event.kind();
        // Handlers run without the lock held so they may (un)subscribe
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| (s.id, s.handler.clone()))
            .collect();

        let mut delivered = false;
        let mut stale = Vec::new();
        for (id, handler) in handlers {
            match handler(event) {
                Delivery::Keep => delivered = true,
                Delivery::Unsubscribe => stale.push(id),
            }
        }
        if !stale.is_empty() {
            self.subscriptions.write().retain(|s| !stale.contains(&s.id));
        }

        if !delivered {
            if let TransportEvent::Error { remote, error } = event {
                warn!("Unobserved send error to {}: {}", remote, error);
            }
        }
        delivered
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.read().len())
            .finish()
    }
}
