//! Topic-based event bus for decoupled communication.
//!
//! Used both for the store's raw change signals and for the classified
//! change batches the notifier republishes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Event bus broadcasting payloads of one type on named topics.
///
/// Clones share the same topics.
#[derive(Clone)]
pub struct EventBus<E: Clone + Send + 'static> {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<E>>>>,
    capacity: usize,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Create a bus whose topics buffer up to `capacity` undelivered payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Publish a payload, returning how many subscribers will see it.
    pub fn publish(&self, topic: &str, payload: E) -> usize {
        let sender = self.topics.read().get(topic).cloned();
        match sender {
            // No receivers is not an error
            Some(sender) => sender.send(payload).unwrap_or(0),
            None => 0,
        }
    }

    /// Subscribe to a topic. Dropping the subscription unsubscribes.
    pub fn subscribe(&self, topic: &str) -> Subscription<E> {
        let receiver = {
            let mut topics = self.topics.write();
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        Subscription {
            topic: topic.to_string(),
            receiver,
        }
    }

    /// Number of live subscribers on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving side of one topic subscription
pub struct Subscription<E: Clone + Send + 'static> {
    topic: String,
    receiver: broadcast::Receiver<E>,
}

impl<E: Clone + Send + 'static> Subscription<E> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next payload. Returns `None` once the bus is gone.
    ///
    /// Payloads dropped because this subscriber fell behind are logged and
    /// skipped.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "[bus] Subscriber on '{}' lagged, skipped {} payloads",
                        self.topic,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next payload if one is already queued
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_topic_subscribers_only() {
        let bus: EventBus<u32> = EventBus::default();
        let mut first = bus.subscribe("a");
        let mut other = bus.subscribe("b");

        assert_eq!(bus.publish("a", 7), 1);
        assert_eq!(first.recv().await, Some(7));
        assert_eq!(other.try_recv(), None);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus: EventBus<u32> = EventBus::new(4);
        assert_eq!(bus.publish("nobody", 1), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus: EventBus<u32> = EventBus::default();
        let sub = bus.subscribe("a");
        let clone = bus.clone();
        assert_eq!(clone.subscriber_count("a"), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(bus.publish("a", 1), 0);
    }

    #[test]
    fn test_lagging_subscriber_keeps_newest() {
        let bus: EventBus<u32> = EventBus::new(2);
        let mut sub = bus.subscribe("a");
        for i in 0..5 {
            bus.publish("a", i);
        }
        assert_eq!(sub.try_recv(), Some(3));
        assert_eq!(sub.try_recv(), Some(4));
        assert_eq!(sub.try_recv(), None);
    }
}
