//! Event bus carrying service notifications to the integration layer.

use std::collections::BTreeSet;
use std::sync::Arc;

use craftscan_common::{ContextKey, ScanId};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;

use crate::fingerprint::RebuildReason;
use crate::variant::CatalogVariant;

/// Notifications published by the craftability service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// A scan request left through the transport
    ScanSent {
        /// Correlation id
        scan_id: ScanId,
        /// Requesting context
        context: ContextKey,
    },
    /// A reply matched the cached fingerprint
    CacheReused {
        /// Context served
        context: ContextKey,
        /// Display ids served
        display_ids: Arc<BTreeSet<String>>,
    },
    /// A context result was recomputed
    Rebuilt {
        /// Context rebuilt
        context: ContextKey,
        /// Why it was rebuilt
        reason: RebuildReason,
        /// New display ids
        display_ids: Arc<BTreeSet<String>>,
    },
    /// A rebuild could not complete
    RebuildFailed {
        /// Context affected
        context: ContextKey,
        /// Error description
        error: String,
    },
    /// A fetch reply arrived
    FetchFinished {
        /// Correlation id
        scan_id: ScanId,
        /// Requesting context
        context: ContextKey,
    },
    /// A recipe index became available
    IndexReady {
        /// Variant indexed
        variant: CatalogVariant,
        /// Number of recipes
        recipes: usize,
        /// Whether it came from the on-disk cache
        from_cache: bool,
    },
}

/// Subscriber invoked by [`EventBus::dispatch`].
pub trait EventHandler: Send + Sync {
    /// Handles an event.
    fn handle(&self, event: &ServiceEvent);
}

/// Bounded channel of service events with optional subscribers.
pub struct EventBus {
    sender: Sender<ServiceEvent>,
    receiver: Receiver<ServiceEvent>,
    capacity: usize,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("pending", &self.receiver.len())
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Publishes an event. Dropped when the bus is full.
    pub fn publish(&self, event: ServiceEvent) {
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<ServiceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Registers a subscriber.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    /// Drains pending events, hands each to every subscriber, and returns them.
    pub fn dispatch(&self) -> Vec<ServiceEvent> {
        let events = self.drain();
        let handlers = self.handlers.read();
        for event in &events {
            for handler in handlers.iter() {
                handler.handle(event);
            }
        }
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<ServiceEvent> {
        self.sender.clone()
    }
}
