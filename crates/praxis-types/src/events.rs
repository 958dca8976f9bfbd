use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, PresenceEntry};

/// Events carried over the realtime transport.
///
/// The same logical message can arrive twice: once as a low-latency
/// broadcast (`MessageBroadcast`) and once as the durable-store change
/// notification (`MessageInserted`). The reconciling store's upsert is
/// idempotent on the confirmed id, so consumers treat both the same way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// A row landed in the durable message table
    MessageInserted { message: Message },

    /// Fast-path echo of a message, before the durable write is visible
    MessageBroadcast { message: Message },

    /// A user started or stopped typing
    Typing {
        user_id: Uuid,
        user_name: String,
        is_typing: bool,
    },

    /// An identity joined the presence topic
    PresenceJoin { entry: PresenceEntry },

    /// An identity left the presence topic
    PresenceLeave { user_id: Uuid },

    /// Full snapshot of identities currently tracked on the topic.
    /// Consumers replace their remote-derived state atomically.
    PresenceSync { entries: Vec<PresenceEntry> },
}

/// Observable state of a realtime subscription. Surfaced to the caller;
/// the core never retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Error,
    TimedOut,
    Closed,
}
