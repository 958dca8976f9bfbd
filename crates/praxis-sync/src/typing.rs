use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use praxis_realtime::SignalHub;
use praxis_realtime::hub::typing_topic;
use praxis_types::events::RealtimeEvent;

/// How long a typing signal stays alive without a refresh.
const IDLE_WINDOW: Duration = Duration::from_secs(3);

/// Sweep cadence for expiring remote signals whose stop was lost.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct TypingState {
    is_typing: bool,
    deadline: Instant,
    /// Remote typists keyed by user id, with local receive time for expiry
    remote: HashMap<Uuid, (String, Instant)>,
}

/// Debounced typing broadcaster plus timeout-based collector for one room.
///
/// Outbound: the first keystroke of a burst broadcasts `is_typing: true`;
/// each keystroke extends the idle deadline; 3 s of silence (or an explicit
/// stop) broadcasts `false` once. Inbound: remote signals land in a map
/// that a 1 s sweep prunes after the same window. The sweep is defense in
/// depth against a lost stop signal, not the primary path.
#[derive(Clone)]
pub struct TypingCoordinator {
    inner: Arc<TypingInner>,
}

struct TypingInner {
    hub: SignalHub,
    topic: String,
    user_id: Uuid,
    user_name: String,
    state: Mutex<TypingState>,
    cancel: CancellationToken,
}

impl TypingCoordinator {
    pub async fn spawn(hub: SignalHub, room_id: Uuid, user_id: Uuid, user_name: String) -> Self {
        let topic = typing_topic(room_id);
        let rx = hub.subscribe(&topic).await;

        let coordinator = Self {
            inner: Arc::new(TypingInner {
                hub,
                topic,
                user_id,
                user_name,
                state: Mutex::new(TypingState {
                    is_typing: false,
                    deadline: Instant::now(),
                    remote: HashMap::new(),
                }),
                cancel: CancellationToken::new(),
            }),
        };
        coordinator.spawn_remote_task(rx);
        coordinator.spawn_sweep_task();
        coordinator
    }

    /// Called on every local keystroke. Broadcasts `true` only on the first
    /// call of a burst; every call pushes the idle deadline out.
    pub async fn start_typing(&self) {
        let first = {
            let mut st = self.lock_state();
            st.deadline = Instant::now() + IDLE_WINDOW;
            let first = !st.is_typing;
            st.is_typing = true;
            first
        };
        if first {
            self.broadcast(true).await;
            self.spawn_idle_watcher();
        }
    }

    /// Explicit stop (message sent, input cleared). Broadcasts `false`
    /// immediately if a burst was active.
    pub async fn stop_typing(&self) {
        let was_typing = {
            let mut st = self.lock_state();
            let was = st.is_typing;
            st.is_typing = false;
            was
        };
        if was_typing {
            self.broadcast(false).await;
        }
    }

    /// Names of everyone currently typing, oldest signal first.
    pub fn typers(&self) -> Vec<String> {
        let st = self.lock_state();
        let mut entries: Vec<(&String, &Instant)> =
            st.remote.values().map(|(name, at)| (name, at)).collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Human-readable projection of who is typing.
    pub fn banner(&self) -> Option<String> {
        typing_banner(&self.typers())
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TypingState> {
        self.inner.state.lock().expect("typing state lock poisoned")
    }

    async fn broadcast(&self, is_typing: bool) {
        self.inner
            .hub
            .publish(
                &self.inner.topic,
                RealtimeEvent::Typing {
                    user_id: self.inner.user_id,
                    user_name: self.inner.user_name.clone(),
                    is_typing,
                },
            )
            .await;
    }

    /// Watches the idle deadline for the current burst. The deadline may be
    /// pushed out by further keystrokes, so re-check after every wakeup.
    fn spawn_idle_watcher(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let deadline = {
                    inner.state.lock().expect("typing state lock poisoned").deadline
                };
                tokio::select! {
                    _ = inner.cancel.cancelled() => return,
                    _ = time::sleep_until(deadline) => {}
                }
                let fire = {
                    let mut st = inner.state.lock().expect("typing state lock poisoned");
                    if !st.is_typing {
                        // stop_typing already broadcast the false
                        return;
                    }
                    if Instant::now() >= st.deadline {
                        st.is_typing = false;
                        true
                    } else {
                        false
                    }
                };
                if fire {
                    let event = RealtimeEvent::Typing {
                        user_id: inner.user_id,
                        user_name: inner.user_name.clone(),
                        is_typing: false,
                    };
                    inner.hub.publish(&inner.topic, event).await;
                    return;
                }
            }
        });
    }

    fn spawn_remote_task(&self, mut rx: broadcast::Receiver<RealtimeEvent>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    result = rx.recv() => match result {
                        Ok(RealtimeEvent::Typing { user_id, user_name, is_typing }) => {
                            if inner.cancel.is_cancelled() {
                                break;
                            }
                            if user_id == inner.user_id {
                                continue;
                            }
                            let mut st = inner.state.lock().expect("typing state lock poisoned");
                            if is_typing {
                                // Refresh keeps the original arrival slot
                                match st.remote.get_mut(&user_id) {
                                    Some((_, at)) => *at = Instant::now(),
                                    None => {
                                        st.remote.insert(user_id, (user_name, Instant::now()));
                                    }
                                }
                            } else {
                                st.remote.remove(&user_id);
                            }
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("typing signals lagged by {n}");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    fn spawn_sweep_task(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(SWEEP_INTERVAL);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = tick.tick() => {}
                }
                if inner.cancel.is_cancelled() {
                    break;
                }
                let mut st = inner.state.lock().expect("typing state lock poisoned");
                let before = st.remote.len();
                st.remote.retain(|_, (_, at)| at.elapsed() < IDLE_WINDOW);
                let swept = before - st.remote.len();
                if swept > 0 {
                    debug!("swept {swept} stale typing signals");
                }
            }
        });
    }
}

/// Projection: 0 names -> nothing; 1 -> "X is typing..."; 2 -> "X and Y are
/// typing..."; 3+ -> comma-joined head with "and" before the last name.
pub fn typing_banner(names: &[String]) -> Option<String> {
    match names {
        [] => None,
        [only] => Some(format!("{only} is typing...")),
        [head @ .., last] => Some(format!("{} and {} are typing...", head.join(", "), last)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_banner_formats() {
        assert_eq!(typing_banner(&[]), None);
        assert_eq!(
            typing_banner(&names(&["Ana"])),
            Some("Ana is typing...".into())
        );
        assert_eq!(
            typing_banner(&names(&["Ana", "Beto"])),
            Some("Ana and Beto are typing...".into())
        );
        assert_eq!(
            typing_banner(&names(&["Ana", "Beto", "Clara"])),
            Some("Ana, Beto and Clara are typing...".into())
        );
        assert_eq!(
            typing_banner(&names(&["Ana", "Beto", "Clara", "Davi"])),
            Some("Ana, Beto, Clara and Davi are typing...".into())
        );
    }

    async fn collect_typing(rx: &mut broadcast::Receiver<RealtimeEvent>) -> Vec<bool> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RealtimeEvent::Typing { is_typing, .. } = event {
                seen.push(is_typing);
            }
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_broadcasts_true_once_then_false_once() {
        let hub = SignalHub::new();
        let room = Uuid::new_v4();
        let mut rx = hub.subscribe(&typing_topic(room)).await;

        let typing =
            TypingCoordinator::spawn(hub, room, Uuid::new_v4(), "Ana".into()).await;

        // Repeated keystrokes inside the idle window
        for _ in 0..5 {
            typing.start_typing().await;
            time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(collect_typing(&mut rx).await, vec![true]);

        // Silence past the idle window fires exactly one false
        time::sleep(IDLE_WINDOW + Duration::from_millis(100)).await;
        assert_eq!(collect_typing(&mut rx).await, vec![false]);

        // And nothing more after that
        time::sleep(Duration::from_secs(5)).await;
        assert!(collect_typing(&mut rx).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_typing_broadcasts_false_immediately() {
        let hub = SignalHub::new();
        let room = Uuid::new_v4();
        let mut rx = hub.subscribe(&typing_topic(room)).await;

        let typing =
            TypingCoordinator::spawn(hub, room, Uuid::new_v4(), "Ana".into()).await;

        typing.start_typing().await;
        typing.stop_typing().await;
        assert_eq!(collect_typing(&mut rx).await, vec![true, false]);

        // The idle watcher must not fire a second false
        time::sleep(IDLE_WINDOW + Duration::from_secs(1)).await;
        assert!(collect_typing(&mut rx).await.is_empty());

        // Stop without an active burst is a no-op
        typing.stop_typing().await;
        assert!(collect_typing(&mut rx).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expires_signals_without_a_stop() {
        let hub = SignalHub::new();
        let room = Uuid::new_v4();
        let typing =
            TypingCoordinator::spawn(hub.clone(), room, Uuid::new_v4(), "Ana".into()).await;

        // Remote signal whose stop never arrives (at-least-once world)
        hub.publish(
            &typing_topic(room),
            RealtimeEvent::Typing {
                user_id: Uuid::new_v4(),
                user_name: "Beto".into(),
                is_typing: true,
            },
        )
        .await;
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(typing.typers(), vec!["Beto".to_string()]);

        time::sleep(IDLE_WINDOW + Duration::from_secs(2)).await;
        assert!(typing.typers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_signal_collection() {
        let hub = SignalHub::new();
        let room = Uuid::new_v4();
        let typing =
            TypingCoordinator::spawn(hub.clone(), room, Uuid::new_v4(), "Ana".into()).await;

        typing.shutdown();
        hub.publish(
            &typing_topic(room),
            RealtimeEvent::Typing {
                user_id: Uuid::new_v4(),
                user_name: "Beto".into(),
                is_typing: true,
            },
        )
        .await;
        time::sleep(Duration::from_millis(100)).await;
        assert!(typing.typers().is_empty(), "signals after shutdown are dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_clears_remote_entry() {
        let hub = SignalHub::new();
        let room = Uuid::new_v4();
        let typing =
            TypingCoordinator::spawn(hub.clone(), room, Uuid::new_v4(), "Ana".into()).await;

        let beto = Uuid::new_v4();
        hub.publish(
            &typing_topic(room),
            RealtimeEvent::Typing {
                user_id: beto,
                user_name: "Beto".into(),
                is_typing: true,
            },
        )
        .await;
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(typing.banner(), Some("Beto is typing...".into()));

        hub.publish(
            &typing_topic(room),
            RealtimeEvent::Typing {
                user_id: beto,
                user_name: "Beto".into(),
                is_typing: false,
            },
        )
        .await;
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(typing.banner(), None);
    }
}
