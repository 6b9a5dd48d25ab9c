//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{EventFilter, LedgerEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// A subscription handle for receiving events.
///
/// When dropped, the subscription is automatically cleaned up.
pub struct Subscription {
    receiver: broadcast::Receiver<LedgerEvent>,
    filter: EventFilter,
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    topic_key: String,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<LedgerEvent>,
        filter: EventFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        topic_key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            subscriptions,
            topic_key,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<LedgerEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Try to receive the next matching event without waiting.
    pub fn try_recv(&mut self) -> Result<Option<LedgerEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    /// Drain every matching event currently buffered.
    pub fn drain(&mut self) -> Vec<LedgerEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subs = self.subscriptions.write();
        let Some(count) = subs.get_mut(&self.topic_key) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            subs.remove(&self.topic_key);
        }
        debug!(topic = %self.topic_key, "Subscription dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::{EventPublisher, InMemoryEventBus};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        bus.publish(LedgerEvent::TransactionWithdrawn { hash: [1; 32] });

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert!(matches!(
            received,
            LedgerEvent::TransactionWithdrawn { hash } if hash == [1; 32]
        ));
    }

    #[tokio::test]
    async fn test_subscription_skips_unmatched_topics() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Blocks]));

        bus.publish(LedgerEvent::TransactionWithdrawn { hash: [1; 32] });
        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    #[test]
    fn test_drain_collects_buffered_events() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        for i in 0..3u8 {
            bus.publish(LedgerEvent::TransactionWithdrawn { hash: [i; 32] });
        }
        assert_eq!(sub.drain().len(), 3);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_closed_bus_reports_closed() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert_eq!(sub.try_recv().unwrap_err(), SubscriptionError::Closed);
    }
}
