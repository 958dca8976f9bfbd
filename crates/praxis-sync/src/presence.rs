use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, broadcast};
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use praxis_realtime::SignalHub;
use praxis_realtime::hub::PRESENCE_TOPIC;
use praxis_types::events::RealtimeEvent;
use praxis_types::models::{PresenceEntry, PresenceStatus};

/// Durable side of presence: status transitions are persisted so other
/// surfaces (who-is-online lists, audit) survive a reload. Storage itself
/// is out of scope here.
#[async_trait]
pub trait PresenceWriter: Send + Sync {
    async fn write_status(&self, user_id: Uuid, status: PresenceStatus) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// No monitored activity for this long moves `online -> away`
    pub away_after: Duration,

    /// Snapshot entries older than this are treated as offline on merge.
    /// Covers peers that died before their best-effort offline write.
    pub snapshot_ttl: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            away_after: Duration::from_secs(5 * 60),
            snapshot_ttl: Duration::from_secs(90),
        }
    }
}

struct PresenceState {
    status: PresenceStatus,
    last_activity: Instant,
    remote: HashMap<Uuid, PresenceEntry>,
}

/// Tracks the local user's online/away status from activity events and
/// reconciles remote peers from presence-channel snapshots.
///
/// Ownership split: the local entry is authoritative only for this user;
/// remote entries are replaced wholesale on every `PresenceSync` so stale
/// peers never linger.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    hub: SignalHub,
    writer: Arc<dyn PresenceWriter>,
    user_id: Uuid,
    user_name: String,
    config: PresenceConfig,
    state: Mutex<PresenceState>,
    activity: Notify,
    cancel: CancellationToken,
}

impl PresenceTracker {
    pub async fn spawn(
        hub: SignalHub,
        writer: Arc<dyn PresenceWriter>,
        user_id: Uuid,
        user_name: String,
        config: PresenceConfig,
    ) -> Self {
        let rx = hub.subscribe(PRESENCE_TOPIC).await;

        let tracker = Self {
            inner: Arc::new(PresenceInner {
                hub,
                writer,
                user_id,
                user_name,
                config,
                state: Mutex::new(PresenceState {
                    status: PresenceStatus::Online,
                    last_activity: Instant::now(),
                    remote: HashMap::new(),
                }),
                activity: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        };

        // Join the channel and persist the initial online transition
        tracker.announce(PresenceStatus::Online).await;
        tracker.spawn_remote_task(rx);
        tracker.spawn_away_task();
        tracker
    }

    /// Any monitored activity event (pointer, key, click, scroll, touch).
    /// Re-arms the away deadline and recovers from `Away` immediately.
    pub async fn record_activity(&self) {
        let became_online = {
            let mut st = self.lock_state();
            st.last_activity = Instant::now();
            if st.status == PresenceStatus::Away {
                st.status = PresenceStatus::Online;
                true
            } else {
                false
            }
        };
        self.inner.activity.notify_waiters();
        if became_online {
            self.announce(PresenceStatus::Online).await;
        }
    }

    pub fn status(&self) -> PresenceStatus {
        self.lock_state().status
    }

    /// Local entry plus the reconciled remote peers, sorted by name.
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        let st = self.lock_state();
        let mut entries = vec![PresenceEntry {
            user_id: self.inner.user_id,
            user_name: self.inner.user_name.clone(),
            status: st.status,
            last_seen: Utc::now(),
        }];
        entries.extend(st.remote.values().cloned());
        entries.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        entries
    }

    /// Best-effort teardown: the offline write may not complete if the
    /// process dies first; the snapshot TTL covers that gap on the peers.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Err(e) = self
            .inner
            .writer
            .write_status(self.inner.user_id, PresenceStatus::Offline)
            .await
        {
            warn!("offline presence write failed: {e}");
        }
        self.inner.hub.untrack(PRESENCE_TOPIC, self.inner.user_id).await;
        info!("{} left presence", self.inner.user_name);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PresenceState> {
        self.inner.state.lock().expect("presence state lock poisoned")
    }

    /// Publish the local status on the channel and persist it.
    async fn announce(&self, status: PresenceStatus) {
        let entry = PresenceEntry {
            user_id: self.inner.user_id,
            user_name: self.inner.user_name.clone(),
            status,
            last_seen: Utc::now(),
        };
        self.inner.hub.track(PRESENCE_TOPIC, entry).await;
        if let Err(e) = self.inner.writer.write_status(self.inner.user_id, status).await {
            warn!("presence write ({status:?}) failed: {e}");
        }
    }

    fn spawn_remote_task(&self, mut rx: broadcast::Receiver<RealtimeEvent>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    result = rx.recv() => match result {
                        Ok(_) if inner.cancel.is_cancelled() => break,
                        Ok(RealtimeEvent::PresenceSync { entries }) => {
                            merge_snapshot(&inner, entries);
                        }
                        Ok(RealtimeEvent::PresenceJoin { entry }) => {
                            if entry.user_id != inner.user_id {
                                let mut st = inner.state.lock()
                                    .expect("presence state lock poisoned");
                                st.remote.insert(entry.user_id, entry);
                            }
                        }
                        Ok(RealtimeEvent::PresenceLeave { user_id }) => {
                            let mut st = inner.state.lock()
                                .expect("presence state lock poisoned");
                            st.remote.remove(&user_id);
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("presence events lagged by {n}");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    fn spawn_away_task(&self) {
        let inner = self.inner.clone();
        let away_after = self.inner.config.away_after;
        let tracker = self.clone();
        tokio::spawn(async move {
            loop {
                let online_deadline = {
                    let st = inner.state.lock().expect("presence state lock poisoned");
                    (st.status == PresenceStatus::Online)
                        .then(|| st.last_activity + away_after)
                };

                match online_deadline {
                    Some(deadline) => {
                        tokio::select! {
                            _ = inner.cancel.cancelled() => return,
                            _ = time::sleep_until(deadline) => {}
                        }
                        let fire = {
                            let mut st =
                                inner.state.lock().expect("presence state lock poisoned");
                            if st.status == PresenceStatus::Online
                                && st.last_activity + away_after <= Instant::now()
                            {
                                st.status = PresenceStatus::Away;
                                true
                            } else {
                                false
                            }
                        };
                        if fire {
                            tracker.announce(PresenceStatus::Away).await;
                        }
                    }
                    // Away: nothing to time out, wait for activity
                    None => {
                        tokio::select! {
                            _ = inner.cancel.cancelled() => return,
                            _ = inner.activity.notified() => {}
                        }
                    }
                }
            }
        });
    }
}

/// Replace the remote-derived portion of the map atomically. The local
/// user's entry never comes from a snapshot, and entries whose `last_seen`
/// is past the TTL are dropped as offline.
fn merge_snapshot(inner: &PresenceInner, entries: Vec<PresenceEntry>) {
    let now = Utc::now();
    let fresh = |e: &PresenceEntry| {
        now.signed_duration_since(e.last_seen)
            .to_std()
            .map_or(true, |age| age <= inner.config.snapshot_ttl)
    };
    let remote: HashMap<Uuid, PresenceEntry> = entries
        .into_iter()
        .filter(|e| e.user_id != inner.user_id)
        .filter(|e| e.status != PresenceStatus::Offline)
        .filter(fresh)
        .map(|e| (e.user_id, e))
        .collect();

    let mut st = inner.state.lock().expect("presence state lock poisoned");
    st.remote = remote;
}
