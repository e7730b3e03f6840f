/*!
 * Event system for Hausflow.
 *
 * A typed publish/subscribe bus built on tokio broadcast channels. Publishing
 * never blocks: a subscriber that falls behind loses its oldest events
 * instead of stalling the publisher.
 */
use std::fmt::Debug;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{trace, warn};

/// Maximum number of events that can be buffered per subscriber
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Event bus for one event type. Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Debug + Send + 'static> EventBus<T> {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a specific per-subscriber capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event, returning the number of subscribers it was queued for
    pub fn publish(&self, event: T) -> usize {
        match self.sender.send(event) {
            Ok(n) => {
                trace!("Published event to {} receivers", n);
                n
            }
            Err(_) => {
                trace!("No receivers for event");
                0
            }
        }
    }

    /// Subscribe to future events. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Debug + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to an [`EventBus`]
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone + Debug + Send + 'static> Subscription<T> {
    /// Wait for the next event. Returns `None` once the bus is gone.
    ///
    /// Events dropped because this subscriber lagged are logged and skipped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Wait up to `limit` for the first event matching `predicate`
    pub async fn recv_matching<F>(&mut self, limit: Duration, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let wait = async {
            while let Some(event) = self.recv().await {
                if predicate(&event) {
                    return Some(event);
                }
            }
            None
        };

        tokio::time::timeout(limit, wait).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct TestEvent {
        id: u32,
        message: String,
    }

    fn event(id: u32) -> TestEvent {
        TestEvent {
            id,
            message: format!("event {id}"),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        assert_eq!(bus.publish(event(1)), 1);
        assert_eq!(sub.recv().await, Some(event(1)));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.publish(event(2)), 2);
        assert_eq!(sub1.recv().await, Some(event(2)));
        assert_eq!(sub2.recv().await, Some(event(2)));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = EventBus::<TestEvent>::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(event(3)), 0);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_latest() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe();

        for id in 0..5 {
            bus.publish(event(id));
        }

        assert_eq!(sub.recv().await, Some(event(3)));
        assert_eq!(sub.recv().await, Some(event(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_matching() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(event(1));
        bus.publish(event(7));
        let found = sub.recv_matching(Duration::from_secs(1), |e| e.id == 7).await;
        assert_eq!(found, Some(event(7)));

        let missing = sub.recv_matching(Duration::from_secs(1), |e| e.id == 9).await;
        assert_eq!(missing, None);
    }
}
