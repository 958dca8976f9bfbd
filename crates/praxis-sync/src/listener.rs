use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use praxis_realtime::hub::message_topic;
use praxis_realtime::{ChangeFeed, SignalHub};
use praxis_types::events::{ConnectionState, RealtimeEvent};
use praxis_types::models::Message;

use crate::store::{ReconcilingStore, UpsertOutcome};

/// Handle to a running change-feed listener.
///
/// Shutdown is idempotent: the cancellation token was captured when the
/// subscriptions were created, and any event already in flight checks it
/// before touching the store.
pub struct ListenerHandle {
    cancel: CancellationToken,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ListenerHandle {
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch for connection-state changes. The listener reports and stops;
    /// whether to resubscribe is the caller's call.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Feeds one room's reconciling store from both realtime paths: the
/// durable-store change feed and the low-latency broadcast echo. Both
/// normalize to the same `Message` shape, and `upsert` is idempotent on the
/// confirmed id, so the same logical event arriving on both paths (in
/// either order) lands exactly once.
pub struct ChangeFeedListener;

impl ChangeFeedListener {
    pub async fn spawn(
        room_id: Uuid,
        feed: Arc<dyn ChangeFeed>,
        hub: SignalHub,
        store: ReconcilingStore,
        self_user_id: Uuid,
    ) -> ListenerHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);

        let mut feed_rx = match feed.subscribe(room_id).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("change feed subscribe failed for room {room_id}: {e}");
                let _ = state_tx.send(e.connection_state());
                // No task to run; the handle still reports the state
                return ListenerHandle { cancel, state_rx };
            }
        };
        let mut echo_rx = hub.subscribe(&message_topic(room_id)).await;

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,

                    result = feed_rx.recv() => match result {
                        Ok(message) => {
                            if task_cancel.is_cancelled() {
                                break;
                            }
                            apply(&store, message, self_user_id).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("change feed for room {room_id} lagged by {n} events");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            let _ = state_tx.send(ConnectionState::Closed);
                            break;
                        }
                    },

                    result = echo_rx.recv() => match result {
                        Ok(event) => {
                            if task_cancel.is_cancelled() {
                                break;
                            }
                            let message = match event {
                                RealtimeEvent::MessageBroadcast { message }
                                | RealtimeEvent::MessageInserted { message } => message,
                                _ => continue,
                            };
                            apply(&store, message, self_user_id).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("message echo for room {room_id} lagged by {n} events");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            let _ = state_tx.send(ConnectionState::Closed);
                            break;
                        }
                    },
                }
            }
            debug!("change-feed listener for room {room_id} stopped");
        });

        ListenerHandle { cancel, state_rx }
    }
}

/// Normalize and merge one event. Both delivery paths end up here.
async fn apply(store: &ReconcilingStore, mut message: Message, self_user_id: Uuid) {
    message.is_own = message.author_id == self_user_id;
    if store.upsert(message).await == UpsertOutcome::Overwrote {
        warn!("upstream delivered conflicting payloads for the same message id");
    }
}
