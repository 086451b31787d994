//! Event bus routing helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::Sender;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<VecDeque<EventEnvelope>>>,
    replay_capacity: usize,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Construct a bus with a custom replay capacity (minimum one).
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        let replay_capacity = replay_capacity.max(1);
        let (sender, _) = broadcast::channel(replay_capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(replay_capacity))),
            replay_capacity,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish an event to its topic, returning the assigned id.
    ///
    /// Publishing never fails; an event with no live subscribers is only
    /// retained in the replay ring.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            topic: event.topic(),
            timestamp: Utc::now(),
            event,
        };
        {
            let mut replay = self.lock_replay();
            if replay.len() == self.replay_capacity {
                let _ = replay.pop_front();
            }
            replay.push_back(envelope.clone());
        }
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to every topic, replaying buffered events newer than
    /// `since` first.
    #[must_use]
    pub fn subscribe(&self, since: Option<EventId>) -> EventStream {
        let receiver = self.sender.subscribe();
        let backlog = since.map_or_else(VecDeque::new, |id| {
            self.backlog_since(id).into_iter().collect()
        });
        EventStream {
            backlog,
            live: BroadcastStream::new(receiver),
            topic: None,
        }
    }

    /// Subscribe to a single topic.
    #[must_use]
    pub fn subscribe_topic(&self, topic: impl Into<String>) -> EventStream {
        let mut stream = self.subscribe(None);
        stream.topic = Some(topic.into());
        stream
    }

    /// Last event id held in the replay ring.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_replay().back().map(|env| env.id)
    }

    /// Buffered events emitted after `id`.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        self.lock_replay()
            .iter()
            .filter(|env| env.id > id)
            .cloned()
            .collect()
    }

    fn lock_replay(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.replay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber view yielding the replay backlog, then live events.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    live: BroadcastStream<EventEnvelope>,
    topic: Option<String>,
}

impl EventStream {
    /// Next event for this subscriber; `None` once the bus is dropped.
    ///
    /// Events lost to channel overflow are skipped.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        while let Some(envelope) = self.backlog.pop_front() {
            if self.accepts(&envelope) {
                return Some(envelope);
            }
        }
        loop {
            match self.live.next().await? {
                Ok(envelope) if self.accepts(&envelope) => return Some(envelope),
                Ok(_) | Err(BroadcastStreamRecvError::Lagged(_)) => {}
            }
        }
    }

    fn accepts(&self, envelope: &EventEnvelope) -> bool {
        self.topic
            .as_deref()
            .is_none_or(|topic| topic == envelope.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::NotificationKind;
    use crate::topics::{NOTIFICATIONS_TOPIC, STATS_TOPIC};
    use mooring_core::OverallStatistics;
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    fn notification(kind: NotificationKind) -> Event {
        Event::Notification {
            event: kind,
            task_id: Uuid::nil(),
            message: "m".into(),
            task_name: "n".into(),
        }
    }

    #[tokio::test]
    async fn publish_and_replay_from_id() {
        let bus = EventBus::with_capacity(4);
        let first = bus.publish(notification(NotificationKind::TorrentAdded));
        let second = bus.publish(notification(NotificationKind::TorrentRemoved));

        assert_eq!(bus.last_event_id(), Some(second));
        let backlog = bus.backlog_since(first);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, second);

        let mut stream = bus.subscribe(Some(0));
        let replayed = stream.next().await.expect("replayed event");
        assert_eq!(replayed.id, first);
    }

    #[tokio::test]
    async fn replay_ring_drops_oldest() {
        let bus = EventBus::with_capacity(2);
        for _ in 0..3 {
            let _ = bus.publish(notification(NotificationKind::TorrentAdded));
        }
        let ids: Vec<_> = bus.backlog_since(0).iter().map(|env| env.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn topic_subscription_filters_other_topics() {
        let bus = EventBus::new();
        let mut stats = bus.subscribe_topic(STATS_TOPIC);
        let _ = bus.publish(notification(NotificationKind::TorrentAdded));
        let id = bus.publish(Event::Statistics {
            overall: OverallStatistics::default(),
        });

        let envelope = timeout(Duration::from_secs(1), stats.next())
            .await
            .expect("stats event in time")
            .expect("stream open");
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.topic, STATS_TOPIC);
        assert_ne!(envelope.topic, NOTIFICATIONS_TOPIC);
    }
}
