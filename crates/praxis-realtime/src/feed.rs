use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use praxis_types::models::Message;

use crate::error::TransportError;

const FEED_CAPACITY: usize = 256;

/// Durable-store change notifications: row-insert events scoped by room.
///
/// This is the slow-but-authoritative path into the reconciling store; the
/// fast path is a [`crate::hub::SignalHub`] broadcast carrying the same
/// message shape. The listener subscribes to both.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, room_id: Uuid)
        -> Result<broadcast::Receiver<Message>, TransportError>;
}

/// In-memory change feed. The durable store (out of scope here) calls
/// `notify_inserted` after each committed insert.
#[derive(Clone)]
pub struct LocalChangeFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    rooms: RwLock<HashMap<Uuid, broadcast::Sender<Message>>>,
}

impl LocalChangeFeed {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FeedInner {
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    async fn sender(&self, room_id: Uuid) -> broadcast::Sender<Message> {
        if let Some(tx) = self.inner.rooms.read().await.get(&room_id) {
            return tx.clone();
        }
        let mut rooms = self.inner.rooms.write().await;
        rooms
            .entry(room_id)
            .or_insert_with(|| {
                debug!("opening change feed for room {room_id}");
                broadcast::channel(FEED_CAPACITY).0
            })
            .clone()
    }

    /// Emit a row-inserted notification for the message's room.
    pub async fn notify_inserted(&self, message: Message) {
        let _ = self.sender(message.room_id).await.send(message);
    }
}

impl Default for LocalChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(
        &self,
        room_id: Uuid,
    ) -> Result<broadcast::Receiver<Message>, TransportError> {
        Ok(self.sender(room_id).await.subscribe())
    }
}
