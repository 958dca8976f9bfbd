use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use praxis_types::call::{CallSession, TranscriptSegment};

use crate::actions::ActionLayer;
use crate::error::CallError;
use crate::provider::{MeetingProvider, ProviderEvent, SessionHandle};
use crate::quality::{AdaptiveQuality, QualityAction, QualityConfig, QualitySuggestion};
use crate::recording::{RecordingDecision, RecordingGate};
use crate::screenshare::ScreenshareArbiter;
use crate::transcript::TranscriptCapture;

/// Session lifecycle. `Error` is reachable from the three establishment
/// phases and is retried by re-opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Connecting,
    Initializing,
    Joining,
    Active,
    Exiting,
    Error,
}

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub call_id: i64,
    pub meeting_id: String,
    /// Auth credential for the provider; absence fails the open immediately
    pub credential: Option<String>,
    /// Initial device defaults
    pub audio: bool,
    pub video: bool,
    pub is_initiator: bool,
}

pub type CallEndedHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct CallConfig {
    pub quality: QualityConfig,
    /// Invoked at exit when this session's initiator flag is set
    pub on_call_ended: Option<CallEndedHook>,
}

/// Orchestrates one call at a time against the video-session provider and
/// the backend action layer, composing recording consent, screenshare
/// arbitration, adaptive quality and transcript capture.
///
/// All mutation funnels through the internal lock; provider callbacks are
/// pumped by a single task guarded by a cancellation token captured at
/// join time, so late events never touch a torn-down session.
#[derive(Clone)]
pub struct CallController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    provider: Arc<dyn MeetingProvider>,
    actions: Arc<dyn ActionLayer>,
    config: CallConfig,
    core: Mutex<Core>,
}

struct Core {
    state: CallState,
    call_id: i64,
    meeting_id: String,
    is_initiator: bool,
    /// "joined" was registered with the backend for this session
    joined: bool,
    session: Option<CallSession>,
    handle: Option<Arc<dyn SessionHandle>>,
    gate: Option<RecordingGate>,
    arbiter: ScreenshareArbiter,
    quality: AdaptiveQuality,
    transcript: TranscriptCapture,
    pump_cancel: CancellationToken,
}

impl Core {
    fn active_handle(&self) -> Result<Arc<dyn SessionHandle>, CallError> {
        if self.state != CallState::Active {
            return Err(CallError::NotActive);
        }
        self.handle.clone().ok_or(CallError::NotActive)
    }

    /// Mirror the gate's state onto the session record.
    fn sync_recording(&mut self) {
        if let (Some(gate), Some(session)) = (self.gate.as_ref(), self.session.as_mut()) {
            session.recording = gate.state().clone();
        }
    }
}

impl CallController {
    pub fn new(
        provider: Arc<dyn MeetingProvider>,
        actions: Arc<dyn ActionLayer>,
        config: CallConfig,
    ) -> Self {
        let quality = AdaptiveQuality::new(config.quality.clone());
        Self {
            inner: Arc::new(ControllerInner {
                provider,
                actions,
                config,
                core: Mutex::new(Core {
                    state: CallState::Idle,
                    call_id: 0,
                    meeting_id: String::new(),
                    is_initiator: false,
                    joined: false,
                    session: None,
                    handle: None,
                    gate: None,
                    arbiter: ScreenshareArbiter::new(),
                    quality,
                    transcript: TranscriptCapture::new(),
                    pump_cancel: CancellationToken::new(),
                }),
            }),
        }
    }

    pub async fn state(&self) -> CallState {
        self.inner.core.lock().await.state
    }

    /// Snapshot of the current session record, if any.
    pub async fn session(&self) -> Option<CallSession> {
        self.inner.core.lock().await.session.clone()
    }

    /// Drive `idle -> connecting -> initializing -> joining -> active`.
    /// Any establishment failure lands in `Error`; retry by calling `open`
    /// again.
    pub async fn open(&self, req: OpenRequest) -> Result<(), CallError> {
        let mut core = self.inner.core.lock().await;
        if !matches!(core.state, CallState::Idle | CallState::Error) {
            return Err(CallError::AlreadyOpen);
        }
        if req.credential.as_deref().filter(|c| !c.is_empty()).is_none() {
            core.state = CallState::Error;
            return Err(CallError::MissingCredential);
        }

        core.state = CallState::Connecting;
        core.call_id = req.call_id;
        core.meeting_id = req.meeting_id.clone();
        core.is_initiator = req.is_initiator;

        // Register "joined" with the backend at most once per session.
        // This failure blocks entering the call; everything later is
        // recoverable.
        if !core.joined {
            if let Err(e) = self.inner.actions.join_call(req.call_id).await {
                core.state = CallState::Error;
                return Err(e.into());
            }
            core.joined = true;
        }

        core.state = CallState::Initializing;
        let handle = match self
            .inner
            .provider
            .join(&req.meeting_id, req.audio, req.video)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                core.state = CallState::Error;
                return Err(e.into());
            }
        };

        core.state = CallState::Joining;
        core.session = Some(CallSession::new(&req.meeting_id, handle.self_participant()));
        core.gate = Some(RecordingGate::new(self.inner.actions.clone(), req.call_id));
        core.arbiter = ScreenshareArbiter::new();
        core.quality = AdaptiveQuality::new(self.inner.config.quality.clone());
        core.transcript.clear();
        core.pump_cancel = CancellationToken::new();

        let events = handle.events();
        core.handle = Some(handle);
        self.spawn_event_pump(events, core.pump_cancel.clone());

        core.state = CallState::Active;
        info!("call {} active in meeting {}", req.call_id, req.meeting_id);
        Ok(())
    }

    /// Teardown, in order: stop recording, leave the provider, flush the
    /// transcript, unregister with the backend, fire the end-of-call hook,
    /// reset. Every step is caught and logged; no step blocks the rest.
    pub async fn close(&self) {
        let mut core = self.inner.core.lock().await;
        if matches!(core.state, CallState::Idle | CallState::Exiting) {
            return;
        }
        core.state = CallState::Exiting;
        // Late provider callbacks must not mutate a tearing-down session
        core.pump_cancel.cancel();

        // (1) stop an active recording and await the ack
        if let Some(gate) = core.gate.as_mut() {
            if gate.is_active() {
                if let Err(e) = gate.stop().await {
                    warn!("recording stop failed during exit: {e}");
                }
            }
        }

        // (2) leave the underlying provider session
        if let Some(handle) = core.handle.take() {
            if let Err(e) = handle.leave().await {
                warn!("provider leave failed during exit: {e}");
            }
        }

        // (3) flush finalized transcript text as a single ordered blob
        if let Some(text) = core.transcript.flush_final() {
            if let Err(e) = self.inner.actions.save_transcript(core.call_id, &text).await {
                warn!("transcript flush failed during exit: {e}");
            }
        }

        // (4) unregister "left", only if registered, only once
        if core.joined {
            if let Err(e) = self.inner.actions.leave_call(core.call_id).await {
                warn!("leave_call failed during exit: {e}");
            }
            core.joined = false;
        }

        // (5) the initiator notifies the caller
        if core.is_initiator {
            if let Some(hook) = &self.inner.config.on_call_ended {
                hook();
            }
        }

        // (6) reset
        core.session = None;
        core.gate = None;
        core.transcript.clear();
        core.arbiter = ScreenshareArbiter::new();
        core.state = CallState::Idle;
        info!("call {} closed", core.call_id);
    }

    pub async fn set_audio(&self, enabled: bool) -> Result<(), CallError> {
        let handle = self.active_handle().await?;
        handle.set_audio(enabled).await?;
        Ok(())
    }

    pub async fn set_video(&self, enabled: bool) -> Result<(), CallError> {
        let handle = self.active_handle().await?;
        handle.set_video(enabled).await?;
        if enabled {
            // The user re-enabled video themselves; adaptive quality no
            // longer owns the disabled state
            self.inner.core.lock().await.quality.reset_ownership();
        }
        Ok(())
    }

    /// Ask for the screenshare. `Ok(false)` means another participant owns
    /// it: refused locally and silently, the UI just shows disabled.
    pub async fn start_screenshare(&self) -> Result<bool, CallError> {
        let (handle, granted) = {
            let mut core = self.inner.core.lock().await;
            let handle = core.active_handle()?;
            let self_id = core
                .session
                .as_ref()
                .map(|s| s.self_participant.id.clone())
                .ok_or(CallError::NotActive)?;
            match core.arbiter.request_local(&self_id) {
                Ok(()) => {
                    if let Some(session) = core.session.as_mut() {
                        session.screenshare_owner = Some(self_id);
                    }
                    (handle, true)
                }
                Err(conflict) => {
                    debug!("screenshare refused: {conflict}");
                    (handle, false)
                }
            }
        };
        if granted {
            handle.set_screenshare(true).await?;
        }
        Ok(granted)
    }

    pub async fn stop_screenshare(&self) -> Result<(), CallError> {
        let handle = {
            let mut core = self.inner.core.lock().await;
            let handle = core.active_handle()?;
            if let Some(self_id) = core.session.as_ref().map(|s| s.self_participant.id.clone()) {
                core.arbiter.release_local(&self_id);
            }
            let owner = core.arbiter.owner().map(str::to_string);
            if let Some(session) = core.session.as_mut() {
                session.screenshare_owner = owner;
            }
            handle
        };
        handle.set_screenshare(false).await?;
        Ok(())
    }

    /// Consent check before recording: alone means start right away,
    /// otherwise the caller must confirm with everyone listed.
    pub async fn request_recording(&self) -> Result<RecordingDecision, CallError> {
        let core = self.inner.core.lock().await;
        match (core.gate.as_ref(), core.session.as_ref()) {
            (Some(gate), Some(session)) => Ok(gate.evaluate(session)),
            _ => Err(CallError::NotActive),
        }
    }

    /// Issue the start command (call this directly for a solo start, or
    /// after the consent dialog confirms). Returns the recording id.
    pub async fn confirm_recording(&self) -> Result<String, CallError> {
        let mut core = self.inner.core.lock().await;
        let meeting_id = core.meeting_id.clone();
        let gate = core.gate.as_mut().ok_or(CallError::NotActive)?;
        let recording_id = gate.start(&meeting_id).await?;
        core.sync_recording();
        Ok(recording_id)
    }

    pub async fn stop_recording(&self) -> Result<(), CallError> {
        let mut core = self.inner.core.lock().await;
        let gate = core.gate.as_mut().ok_or(CallError::NotActive)?;
        let result = gate.stop().await;
        core.sync_recording();
        result.map_err(CallError::from)
    }

    /// The currently raised quality suggestion, if any.
    pub async fn quality_suggestion(&self) -> Option<QualitySuggestion> {
        self.inner.core.lock().await.quality.pending()
    }

    /// Apply the pending suggestion by toggling video accordingly.
    pub async fn apply_quality_suggestion(&self) -> Result<(), CallError> {
        let (handle, suggestion) = {
            let mut core = self.inner.core.lock().await;
            let handle = core.active_handle()?;
            (handle, core.quality.apply())
        };
        match suggestion {
            Some(QualitySuggestion::DisableVideo) => handle.set_video(false).await?,
            Some(QualitySuggestion::EnableVideo) => handle.set_video(true).await?,
            None => {}
        }
        Ok(())
    }

    pub async fn dismiss_quality_suggestion(&self) {
        self.inner.core.lock().await.quality.dismiss();
    }

    /// Live transcript so far (interim segments included).
    pub async fn transcript(&self) -> Vec<TranscriptSegment> {
        self.inner.core.lock().await.transcript.segments().to_vec()
    }

    async fn active_handle(&self) -> Result<Arc<dyn SessionHandle>, CallError> {
        self.inner.core.lock().await.active_handle()
    }

    fn spawn_event_pump(
        &self,
        mut rx: broadcast::Receiver<ProviderEvent>,
        cancel: CancellationToken,
    ) {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = rx.recv() => match result {
                        Ok(event) => {
                            if cancel.is_cancelled() {
                                break;
                            }
                            controller.apply_event(event).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("provider events lagged by {n}");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("provider event pump stopped");
        });
    }

    async fn apply_event(&self, event: ProviderEvent) {
        // Deferred video toggle decided under the lock, executed outside it
        let mut toggle_video: Option<(Arc<dyn SessionHandle>, bool)> = None;
        {
            let mut core = self.inner.core.lock().await;
            if core.state != CallState::Active {
                return;
            }
            match event {
                ProviderEvent::ParticipantJoined { participant } => {
                    if let Some(session) = core.session.as_mut() {
                        session.upsert_participant(participant);
                    }
                }
                ProviderEvent::ParticipantLeft { participant_id } => {
                    if let Some(session) = core.session.as_mut() {
                        session.remove_participant(&participant_id);
                    }
                    // A leaver implicitly drops any share they held
                    core.arbiter.apply_remote(&participant_id, false);
                    let owner = core.arbiter.owner().map(str::to_string);
                    if let Some(session) = core.session.as_mut() {
                        session.screenshare_owner = owner;
                    }
                }
                ProviderEvent::AudioUpdate { participant_id, enabled } => {
                    if let Some(session) = core.session.as_mut() {
                        session.apply_audio_update(&participant_id, enabled);
                    }
                }
                ProviderEvent::VideoUpdate { participant_id, enabled } => {
                    let is_self = core
                        .session
                        .as_ref()
                        .is_some_and(|s| s.self_participant.id == participant_id);
                    if let Some(session) = core.session.as_mut() {
                        session.apply_video_update(&participant_id, enabled);
                    }
                    if is_self && enabled {
                        core.quality.reset_ownership();
                    }
                }
                ProviderEvent::ScreenShareUpdate { participant_id, enabled } => {
                    core.arbiter.apply_remote(&participant_id, enabled);
                    let owner = core.arbiter.owner().map(str::to_string);
                    if let Some(session) = core.session.as_mut() {
                        session.apply_screenshare_update(&participant_id, enabled);
                        session.screenshare_owner = owner;
                    }
                }
                ProviderEvent::NetworkQualityUpdate { score } => {
                    let video_enabled = core
                        .session
                        .as_ref()
                        .is_some_and(|s| s.self_participant.video_enabled);
                    if let Some(session) = core.session.as_mut() {
                        session.network_score = score;
                    }
                    match core.quality.observe(score, video_enabled, Instant::now().into_std()) {
                        QualityAction::AutoDisable => {
                            if let Ok(handle) = core.active_handle() {
                                toggle_video = Some((handle, false));
                            }
                        }
                        QualityAction::AutoEnable => {
                            if let Ok(handle) = core.active_handle() {
                                toggle_video = Some((handle, true));
                            }
                        }
                        QualityAction::Suggest(s) => {
                            info!("network quality suggestion raised: {s:?}");
                        }
                        QualityAction::None => {}
                    }
                }
                ProviderEvent::RecordingUpdate { active } => {
                    if let Some(gate) = core.gate.as_mut() {
                        gate.sync_remote(active);
                    }
                    core.sync_recording();
                }
                ProviderEvent::Transcript { segment } => {
                    core.transcript.push(segment);
                }
            }
        }
        if let Some((handle, enabled)) = toggle_video {
            if let Err(e) = handle.set_video(enabled).await {
                warn!("adaptive video toggle failed: {e}");
            }
        }
    }
}

