//! Event router
//!
//! Fans decoded dispatch events out to per-topic delivery queues. Each topic
//! is a bounded broadcast channel: every consumer has its own cursor, a slow
//! consumer loses the oldest events beyond the capacity and is told how many,
//! and the read loop never waits on a consumer.

mod stream;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::events::{DispatchEvent, Topic};

pub use stream::EventStream;

/// Per-topic event fan-out
pub struct EventRouter {
    senders: [broadcast::Sender<Arc<DispatchEvent>>; Topic::ALL.len()],
    capacity: usize,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    /// Router whose topic queues each hold `capacity` events
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            senders: std::array::from_fn(|_| broadcast::channel(capacity).0),
            capacity,
        }
    }

    /// Register a consumer; it sees events routed from now on
    pub fn subscribe(&self, topic: Topic) -> EventStream {
        EventStream::new(topic, self.senders[topic.index()].subscribe())
    }

    /// Deliver an event to its topic's consumers
    ///
    /// Returns the number of consumers reached. Events without a topic and
    /// topics without consumers are discarded.
    pub fn route(&self, event: DispatchEvent) -> usize {
        let Some(topic) = event.topic() else {
            return 0;
        };
        match self.senders[topic.index()].send(Arc::new(event)) {
            Ok(receivers) => {
                tracing::trace!(topic = %topic, receivers, "Event routed");
                receivers
            }
            Err(_) => 0,
        }
    }

    /// Consumers currently registered for `topic`
    pub fn receiver_count(&self, topic: Topic) -> usize {
        self.senders[topic.index()].receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MessageDeleteEvent;
    use chat_core::Snowflake;

    fn delete(id: i64) -> DispatchEvent {
        DispatchEvent::MessageDelete(MessageDeleteEvent {
            id: Snowflake::new(id),
            channel_id: Snowflake::new(1),
            guild_id: None,
        })
    }

    fn deleted_id(event: &DispatchEvent) -> i64 {
        match event {
            DispatchEvent::MessageDelete(e) => e.id.into_inner(),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_route_to_topic_in_order() {
        let router = EventRouter::new(16);
        let mut deletes = router.subscribe(Topic::MessageDelete);
        let mut creates = router.subscribe(Topic::MessageCreate);

        assert_eq!(router.route(delete(1)), 1);
        assert_eq!(router.route(delete(2)), 1);

        assert_eq!(deleted_id(&deletes.recv().await.unwrap()), 1);
        assert_eq!(deleted_id(&deletes.recv().await.unwrap()), 2);
        assert!(creates.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_no_replay_for_late_consumers() {
        let router = EventRouter::new(16);
        assert_eq!(router.route(delete(1)), 0);

        let mut late = router.subscribe(Topic::MessageDelete);
        router.route(delete(2));
        assert_eq!(deleted_id(&late.recv().await.unwrap()), 2);
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_slow_consumer_drops_oldest() {
        let router = EventRouter::new(4);
        let mut slow = router.subscribe(Topic::MessageDelete);
        let mut fast = router.subscribe(Topic::MessageDelete);

        for id in 1..=6 {
            router.route(delete(id));
            assert_eq!(deleted_id(&fast.recv().await.unwrap()), id);
        }

        assert_eq!(deleted_id(&slow.recv().await.unwrap()), 3);
        assert_eq!(slow.dropped(), 2);
        assert_eq!(fast.dropped(), 0);
    }

    #[test]
    fn test_session_events_are_not_routed() {
        let router = EventRouter::new(4);
        let _stream = router.subscribe(Topic::MessageCreate);
        assert_eq!(router.route(DispatchEvent::Resumed), 0);
        assert_eq!(
            router.route(DispatchEvent::Unknown {
                name: "CHANNEL_PINS_UPDATE".to_string()
            }),
            0
        );
        assert_eq!(router.receiver_count(Topic::MessageCreate), 1);
    }
}
