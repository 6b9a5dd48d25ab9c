//! # Event Publisher
//!
//! Defines the publishing side of the event bus.

use crate::events::{EventFilter, LedgerEvent};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing events to the bus.
///
/// Publishing never blocks: settlement runs on a blocking worker and must not
/// wait for slow consumers.
pub trait EventPublisher: Send + Sync {
    /// Publish an event, returning the number of receivers it reached.
    fn publish(&self, event: LedgerEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the event bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
pub struct InMemoryEventBus {
    /// Broadcast sender for events.
    sender: broadcast::Sender<LedgerEvent>,

    /// Active subscription count by topic.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total events published.
    events_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let topic_key = format!("{:?}", filter.topics);
        *self.subscriptions.write().entry(topic_key.clone()).or_insert(0) += 1;

        debug!(topics = ?filter.topics, "New subscription created");

        Subscription::new(receiver, filter, self.subscriptions.clone(), topic_key)
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for InMemoryEventBus {
    fn publish(&self, event: LedgerEvent) -> usize {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(topic = ?topic, receivers = receiver_count, "Event published");
                receiver_count
            }
            Err(_) => {
                // No collaborators attached; the ledger does not depend on them.
                trace!(topic = ?topic, "Event dropped (no receivers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
