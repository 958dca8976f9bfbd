use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use praxis_types::models::{AttachmentData, Message, MessageId, MessageKind, MessageStatus};

/// What `upsert` did with an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New record, appended
    Inserted,

    /// A record with this id was already present and carried the same
    /// payload. No-op (at-least-once delivery absorbed here).
    Duplicate,

    /// A local placeholder was replaced in place by its confirmed
    /// counterpart. `position` is the unchanged list index.
    Replaced { position: usize },

    /// Two events claimed the same confirmed id with different payloads.
    /// Should not happen upstream; last write wins and the caller sees
    /// this outcome as the warning.
    Overwrote,
}

/// In-memory ordered collection of messages per room, with idempotent
/// merge rules.
///
/// List order is arrival order. Replacing a placeholder with its confirmed
/// counterpart keeps the record at the same index, so a projected list
/// never visibly reorders on dedup.
///
/// Owned by the change-feed listener; everything else reads via `list_for`.
#[derive(Clone)]
pub struct ReconcilingStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    rooms: RwLock<HashMap<Uuid, Vec<Message>>>,
    next_temp_id: AtomicU64,
}

impl ReconcilingStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                rooms: RwLock::new(HashMap::new()),
                next_temp_id: AtomicU64::new(1),
            }),
        }
    }

    /// Merge an incoming record into its room.
    ///
    /// - same confirmed id, same payload: no-op (`Duplicate`);
    /// - same confirmed id, different payload: last-write-wins
    ///   (`Overwrote`, logged);
    /// - matches a pending placeholder by `(author, room, content)`:
    ///   replaced at the same position (`Replaced`);
    /// - otherwise appended (`Inserted`).
    pub async fn upsert(&self, message: Message) -> UpsertOutcome {
        let mut rooms = self.inner.rooms.write().await;
        let list = rooms.entry(message.room_id).or_default();

        if let Some(pos) = list.iter().position(|m| m.id == message.id) {
            let existing = &mut list[pos];
            if existing.same_payload(&message) {
                // Duplicate delivery may still carry a status advance
                // (e.g. the read receipt arriving on the second path)
                existing.status = existing.status.advance(message.status);
                return UpsertOutcome::Duplicate;
            }
            warn!(
                "conflicting payloads for message {:?} in room {}, keeping the later one",
                message.id, message.room_id
            );
            let mut replacement = message;
            replacement.status = existing.status.advance(replacement.status);
            replacement.is_own = existing.is_own;
            *existing = replacement;
            return UpsertOutcome::Overwrote;
        }

        if !message.id.is_pending() {
            if let Some(pos) = list.iter().position(|m| m.matches_placeholder(&message)) {
                let mut confirmed = message;
                confirmed.status = list[pos].status.advance(confirmed.status);
                confirmed.is_own = list[pos].is_own;
                list[pos] = confirmed;
                return UpsertOutcome::Replaced { position: pos };
            }
        }

        list.push(message);
        UpsertOutcome::Inserted
    }

    /// Append an optimistic local placeholder and return its pending id.
    pub async fn push_placeholder(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        content: impl Into<String>,
        kind: MessageKind,
        attachment: Option<AttachmentData>,
    ) -> MessageId {
        let id = MessageId::Pending(self.inner.next_temp_id.fetch_add(1, Ordering::Relaxed));
        let now = Utc::now();
        let placeholder = Message {
            id,
            room_id,
            author_id,
            content: content.into(),
            kind,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            status: MessageStatus::Sending,
            attachment,
            is_own: true,
        };
        self.inner
            .rooms
            .write()
            .await
            .entry(room_id)
            .or_default()
            .push(placeholder);
        id
    }

    /// Mark a placeholder as failed (send error). Resending moves it back
    /// to `Sending` via another call to `set_status`.
    pub async fn set_status(&self, room_id: Uuid, id: MessageId, status: MessageStatus) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(m) = rooms
            .get_mut(&room_id)
            .and_then(|list| list.iter_mut().find(|m| m.id == id))
        {
            m.status = m.status.advance(status);
            m.updated_at = Utc::now();
        }
    }

    /// Messages for a room, in arrival order.
    pub async fn list_for(&self, room_id: Uuid) -> Vec<Message> {
        self.inner
            .rooms
            .read()
            .await
            .get(&room_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for ReconcilingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: i64, room: Uuid, author: Uuid, content: &str) -> Message {
        let now = Utc::now();
        Message {
            id: MessageId::Confirmed(id),
            room_id: room,
            author_id: author,
            content: content.into(),
            kind: MessageKind::Text,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            status: MessageStatus::Sent,
            attachment: None,
            is_own: false,
        }
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let store = ReconcilingStore::new();
        let room = Uuid::new_v4();
        let author = Uuid::new_v4();
        let msg = confirmed(7, room, author, "oi");

        assert_eq!(store.upsert(msg.clone()).await, UpsertOutcome::Inserted);
        // Same event from the broadcast path, any number of repeats
        for _ in 0..5 {
            assert_eq!(store.upsert(msg.clone()).await, UpsertOutcome::Duplicate);
        }

        let list = store.list_for(room).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, MessageId::Confirmed(7));
    }

    #[tokio::test]
    async fn test_placeholder_replaced_in_place() {
        let store = ReconcilingStore::new();
        let room = Uuid::new_v4();
        let author = Uuid::new_v4();
        let other = Uuid::new_v4();

        store.upsert(confirmed(1, room, other, "before")).await;
        let pending = store
            .push_placeholder(room, author, "hello", MessageKind::Text, None)
            .await;
        store.upsert(confirmed(2, room, other, "after")).await;

        // Confirmed counterpart arrives: replaced at position 1, not appended
        let outcome = store.upsert(confirmed(9, room, author, "hello")).await;
        assert_eq!(outcome, UpsertOutcome::Replaced { position: 1 });

        let list = store.list_for(room).await;
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].id, MessageId::Confirmed(9));
        assert!(list[1].is_own, "ownership survives confirmation");
        assert!(!list.iter().any(|m| m.id == pending));
    }

    #[tokio::test]
    async fn test_replacement_is_order_independent_across_paths() {
        let store = ReconcilingStore::new();
        let room = Uuid::new_v4();
        let author = Uuid::new_v4();

        store
            .push_placeholder(room, author, "hello", MessageKind::Text, None)
            .await;

        // Broadcast path first, change feed second, or the reverse: one record
        let echo = confirmed(3, room, author, "hello");
        assert_eq!(
            store.upsert(echo.clone()).await,
            UpsertOutcome::Replaced { position: 0 }
        );
        assert_eq!(store.upsert(echo).await, UpsertOutcome::Duplicate);
        assert_eq!(store.list_for(room).await.len(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_payload_last_write_wins() {
        let store = ReconcilingStore::new();
        let room = Uuid::new_v4();
        let author = Uuid::new_v4();

        store.upsert(confirmed(4, room, author, "first")).await;
        let outcome = store.upsert(confirmed(4, room, author, "second")).await;
        assert_eq!(outcome, UpsertOutcome::Overwrote);

        let list = store.list_for(room).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].content, "second");
    }

    #[tokio::test]
    async fn test_duplicate_still_advances_status() {
        let store = ReconcilingStore::new();
        let room = Uuid::new_v4();
        let author = Uuid::new_v4();

        store.upsert(confirmed(5, room, author, "oi")).await;
        let mut read_receipt = confirmed(5, room, author, "oi");
        read_receipt.status = MessageStatus::Read;
        assert_eq!(store.upsert(read_receipt).await, UpsertOutcome::Duplicate);
        assert_eq!(store.list_for(room).await[0].status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn test_failed_placeholder_can_resend() {
        let store = ReconcilingStore::new();
        let room = Uuid::new_v4();
        let author = Uuid::new_v4();

        let id = store
            .push_placeholder(room, author, "oi", MessageKind::Text, None)
            .await;
        store.set_status(room, id, MessageStatus::Failed).await;
        assert_eq!(store.list_for(room).await[0].status, MessageStatus::Failed);

        store.set_status(room, id, MessageStatus::Sending).await;
        assert_eq!(store.list_for(room).await[0].status, MessageStatus::Sending);
    }
}
