//! The event bus observers subscribe to (spec §4.4, §9 "Observer
//! fan-out": "prefer a bounded pub/sub bus: each subscription owns a
//! queue; the publisher enqueues; per-subscriber workers drain").

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use super::types::DomainEvent;

/// Capacity of each subscriber's internal queue. A slow subscriber that
/// falls behind by more than this many events starts missing the
/// oldest ones (spec §5 "Back-pressure": streaming observers drop,
/// they don't block the pipeline).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A handle a subscriber polls for newly published events, in `seq`
/// order relative to its own subscription (spec §5 "Ordering
/// guarantees").
pub struct Subscription {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl Subscription {
    /// Await the next event, or `None` once this subscriber has lagged
    /// past the queue capacity and missed events.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, dropping events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publish/subscribe port every observer and the engine's pipeline
/// share (spec §6 `EventBus: subscribe(event_types, observer)`,
/// `publish(event)`).
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: DomainEvent);
    fn subscribe(&self) -> Subscription;
}

/// In-process bounded-queue bus. Each call to [`subscribe`] gets an
/// independent receiver so one slow subscriber cannot stall another
/// (spec §4.4 "no cross-observer ordering guarantee").
pub struct InMemoryEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: DomainEvent) {
        // No subscribers is a normal state (e.g. a headless run with no
        // observers attached yet); publish failure is not an error.
        let _ = self.sender.send(event);
    }

    fn subscribe(&self) -> Subscription {
        Subscription { receiver: self.sender.subscribe() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{EventMeta, EventScope, EventType};
    use crate::ids::ExecutionId;

    fn sample_event(seq: u64) -> DomainEvent {
        DomainEvent {
            event_type: EventType::ExecutionStarted,
            scope: EventScope { execution_id: ExecutionId::generate(), parent_execution_id: None },
            payload: serde_json::json!({}),
            meta: EventMeta { seq, pipeline_event_count: seq, pipeline_uptime_ms: 0 },
        }
    }

    #[tokio::test]
    async fn independent_subscribers_each_receive_published_events() {
        let bus = InMemoryEventBus::new();
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();
        bus.publish(sample_event(1)).await;

        assert_eq!(sub_a.recv().await.unwrap().meta.seq, 1);
        assert_eq!(sub_b.recv().await.unwrap().meta.seq, 1);
    }
}
