use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a message record.
///
/// A message starts life as `Pending` with a locally-allocated temp id and
/// becomes `Confirmed` once the durable store assigns its primary key. The
/// two cases are an explicit union so nothing can confuse a placeholder
/// with a persisted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MessageId {
    Confirmed(i64),
    Pending(u64),
}

impl MessageId {
    pub fn is_pending(&self) -> bool {
        matches!(self, MessageId::Pending(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Voice,
    File,
    System,
}

/// Delivery status of a message. Transitions are append-only:
/// `sending -> sent -> read`, or `sending -> failed`. The only backwards
/// move is `failed -> sending` on resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Read,
    Failed,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending | MessageStatus::Failed => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Read => 2,
        }
    }

    /// Apply a transition, ignoring anything that would regress.
    pub fn advance(self, next: MessageStatus) -> MessageStatus {
        match (self, next) {
            (MessageStatus::Sending, MessageStatus::Failed) => next,
            (MessageStatus::Failed, MessageStatus::Sending) => next,
            (MessageStatus::Failed, _) | (_, MessageStatus::Failed) => self,
            _ if next.rank() > self.rank() => next,
            _ => self,
        }
    }
}

/// Metadata for a message attachment (voice note, file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentData {
    pub url: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    pub attachment: Option<AttachmentData>,
    pub is_own: bool,
}

impl Message {
    /// True when `confirmed` is the server echo of this local placeholder.
    /// Placeholder ids are provisional, so the match is on author, room and
    /// content instead.
    pub fn matches_placeholder(&self, confirmed: &Message) -> bool {
        self.id.is_pending()
            && self.author_id == confirmed.author_id
            && self.room_id == confirmed.room_id
            && self.content == confirmed.content
    }

    /// Payload equality, ignoring id/status/ownership bookkeeping. Used to
    /// tell a duplicate delivery apart from a genuine conflict.
    pub fn same_payload(&self, other: &Message) -> bool {
        self.content == other.content
            && self.kind == other.kind
            && self.deleted_at == other.deleted_at
            && self.attachment == other.attachment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: Uuid,
    pub user_name: String,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}
