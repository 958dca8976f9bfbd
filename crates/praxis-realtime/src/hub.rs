use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use praxis_types::events::RealtimeEvent;
use praxis_types::models::PresenceEntry;

/// Capacity of each topic's broadcast channel. Slow subscribers lag and
/// drop rather than backpressure the publisher.
const TOPIC_CAPACITY: usize = 256;

/// Fast-path message echo topic for a room.
pub fn message_topic(room_id: Uuid) -> String {
    format!("room:{room_id}:new-message")
}

/// Typing signal topic for a room.
pub fn typing_topic(room_id: Uuid) -> String {
    format!("room:{room_id}:typing")
}

/// Presence topic shared by the whole workspace.
pub const PRESENCE_TOPIC: &str = "presence:global";

/// Topic-scoped publish/subscribe over in-process broadcast channels, with
/// a presence extension (track/untrack/sync snapshots).
///
/// Nothing published here is persisted. Typing signals, fast-path message
/// echoes and presence snapshots all ride on this hub; durable change
/// notifications come from [`crate::feed::ChangeFeed`] instead.
#[derive(Clone)]
pub struct SignalHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// Lazily-created broadcast sender per topic name
    topics: RwLock<HashMap<String, broadcast::Sender<RealtimeEvent>>>,

    /// Presence extension: topic -> tracked identities
    presence: RwLock<HashMap<String, HashMap<Uuid, PresenceEntry>>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: RwLock::new(HashMap::new()),
                presence: RwLock::new(HashMap::new()),
            }),
        }
    }

    async fn sender(&self, topic: &str) -> broadcast::Sender<RealtimeEvent> {
        if let Some(tx) = self.inner.topics.read().await.get(topic) {
            return tx.clone();
        }
        let mut topics = self.inner.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!("creating broadcast topic {topic}");
                broadcast::channel(TOPIC_CAPACITY).0
            })
            .clone()
    }

    /// Subscribe to a topic. Only events published after this call are seen.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<RealtimeEvent> {
        self.sender(topic).await.subscribe()
    }

    /// Publish an event to everyone subscribed to `topic`.
    pub async fn publish(&self, topic: &str, event: RealtimeEvent) {
        // A send error just means nobody is listening right now
        let _ = self.sender(topic).await.send(event);
    }

    /// Track an identity on a presence topic. Emits a `PresenceJoin` for the
    /// entry followed by a full `PresenceSync` snapshot. Re-tracking the
    /// same user refreshes their entry (status changes ride on this).
    pub async fn track(&self, topic: &str, mut entry: PresenceEntry) {
        entry.last_seen = Utc::now();
        {
            let mut presence = self.inner.presence.write().await;
            presence
                .entry(topic.to_string())
                .or_default()
                .insert(entry.user_id, entry.clone());
        }
        debug!("{} tracked on {topic}", entry.user_name);
        self.publish(topic, RealtimeEvent::PresenceJoin { entry }).await;
        self.sync(topic).await;
    }

    /// Stop tracking an identity. Emits `PresenceLeave` plus a fresh
    /// snapshot. Untracking an unknown user is a no-op.
    pub async fn untrack(&self, topic: &str, user_id: Uuid) {
        let removed = {
            let mut presence = self.inner.presence.write().await;
            presence
                .get_mut(topic)
                .map(|m| m.remove(&user_id).is_some())
                .unwrap_or(false)
        };
        if !removed {
            return;
        }
        self.publish(topic, RealtimeEvent::PresenceLeave { user_id }).await;
        self.sync(topic).await;
    }

    /// Identities currently tracked on a topic.
    pub async fn tracked(&self, topic: &str) -> Vec<PresenceEntry> {
        self.inner
            .presence
            .read()
            .await
            .get(topic)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn sync(&self, topic: &str) {
        let entries = self.tracked(topic).await;
        self.publish(topic, RealtimeEvent::PresenceSync { entries }).await;
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_types::models::PresenceStatus;

    fn entry(name: &str) -> PresenceEntry {
        PresenceEntry {
            user_id: Uuid::new_v4(),
            user_name: name.into(),
            status: PresenceStatus::Online,
            last_seen: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = SignalHub::new();
        let mut rx = hub.subscribe("typing:room-1").await;

        hub.publish(
            "typing:room-1",
            RealtimeEvent::Typing {
                user_id: Uuid::new_v4(),
                user_name: "Ana".into(),
                is_typing: true,
            },
        )
        .await;

        match rx.recv().await {
            Ok(RealtimeEvent::Typing { user_name, is_typing, .. }) => {
                assert_eq!(user_name, "Ana");
                assert!(is_typing);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let hub = SignalHub::new();
        let mut rx = hub.subscribe("typing:room-1").await;

        hub.publish(
            "typing:room-2",
            RealtimeEvent::Typing {
                user_id: Uuid::new_v4(),
                user_name: "Beto".into(),
                is_typing: true,
            },
        )
        .await;

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_track_emits_join_then_snapshot() {
        let hub = SignalHub::new();
        let mut rx = hub.subscribe("presence:global").await;

        let ana = entry("Ana");
        hub.track("presence:global", ana.clone()).await;

        assert!(matches!(
            rx.recv().await,
            Ok(RealtimeEvent::PresenceJoin { entry }) if entry.user_id == ana.user_id
        ));
        match rx.recv().await {
            Ok(RealtimeEvent::PresenceSync { entries }) => assert_eq!(entries.len(), 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_untrack_removes_from_snapshot() {
        let hub = SignalHub::new();
        let ana = entry("Ana");
        let beto = entry("Beto");
        hub.track("presence:global", ana.clone()).await;
        hub.track("presence:global", beto).await;

        hub.untrack("presence:global", ana.user_id).await;
        let tracked = hub.tracked("presence:global").await;
        assert_eq!(tracked.len(), 1);
        assert_ne!(tracked[0].user_id, ana.user_id);

        // Idempotent: second untrack is a no-op
        hub.untrack("presence:global", ana.user_id).await;
    }
}
