//! Event Bus: synchronous fan-out of [`Event`]s to every interested
//! subscriber (the Progress Collector, the Tunnel relay, the dashboard).
//!
//! Built on a broadcast channel rather than a pub/sub actor: publishing is a
//! non-blocking, synchronous call, and a slow or absent subscriber can never
//! block a publisher. A subscriber that falls behind sees `Lagged` and can
//! decide to resync rather than bring the whole system down.

use crate::Event;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1_024;

/// Shared event bus. Cheap to clone the handle; the underlying channel is
/// reference-counted.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Never blocks; if there are no subscribers the event
    /// is simply dropped.
    pub fn publish(&self, event: Event) {
        // A `SendError` here just means nobody is currently subscribed.
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream. Each subscriber gets its own copy of
    /// every event published after this call; a snapshot at subscribe time,
    /// not history.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentId;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(Event::StatusUpdate {
            agent_id: AgentId::from("brain"),
            status: "thinking".into(),
        });

        let ea = a.recv().await.unwrap();
        let eb = b.recv().await.unwrap();
        assert!(matches!(ea, Event::StatusUpdate { .. }));
        assert!(matches!(eb, Event::StatusUpdate { .. }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::StatusUpdate {
            agent_id: AgentId::from("brain"),
            status: "idle".into(),
        });
    }
}
