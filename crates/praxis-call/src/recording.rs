use std::sync::Arc;

use tracing::{info, warn};

use praxis_types::call::{CallSession, RecordingState};

use crate::actions::ActionLayer;
use crate::error::BackendRpcError;

/// What has to happen before recording may start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingDecision {
    /// Alone on the call: no consent needed
    StartImmediately,

    /// Others are present: an explicit confirmation listing everyone is
    /// required before the start command is issued
    NeedsConsent { participant_names: Vec<String> },
}

/// Consent gate plus recording-id bookkeeping. The id returned by the
/// backend is tracked so stop targets exactly the recording we started,
/// even across repeated start/stop cycles in one call.
pub struct RecordingGate {
    actions: Arc<dyn ActionLayer>,
    call_id: i64,
    state: RecordingState,
}

impl RecordingGate {
    pub fn new(actions: Arc<dyn ActionLayer>, call_id: i64) -> Self {
        Self {
            actions,
            call_id,
            state: RecordingState::Idle,
        }
    }

    pub fn state(&self) -> &RecordingState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            RecordingState::Starting | RecordingState::Recording { .. }
        )
    }

    /// Count distinct active participants, including self. More than one
    /// means consent first.
    pub fn evaluate(&self, session: &CallSession) -> RecordingDecision {
        if session.participant_count() <= 1 {
            RecordingDecision::StartImmediately
        } else {
            RecordingDecision::NeedsConsent {
                participant_names: session.participant_names(),
            }
        }
    }

    /// Issue the start command (after consent, where required). Saves the
    /// recording url reference as soon as the id is known; that write is
    /// best-effort.
    pub async fn start(&mut self, meeting_id: &str) -> Result<String, BackendRpcError> {
        if self.is_active() {
            // Double-start from a racing click; keep the current recording
            if let RecordingState::Recording { recording_id } = &self.state {
                return Ok(recording_id.clone());
            }
        }
        self.state = RecordingState::Starting;
        let recording_id = match self.actions.start_recording(meeting_id).await {
            Ok(id) => id,
            Err(e) => {
                self.state = RecordingState::Idle;
                return Err(e);
            }
        };
        if let Err(e) = self
            .actions
            .save_recording_url(self.call_id, &recording_id)
            .await
        {
            warn!("saving recording reference failed: {e}");
        }
        info!("recording {recording_id} started for call {}", self.call_id);
        self.state = RecordingState::Recording { recording_id: recording_id.clone() };
        Ok(recording_id)
    }

    /// Stop by the tracked id. No-op when idle.
    pub async fn stop(&mut self) -> Result<(), BackendRpcError> {
        let recording_id = match std::mem::replace(&mut self.state, RecordingState::Stopping) {
            RecordingState::Recording { recording_id } => recording_id,
            other => {
                self.state = other;
                return Ok(());
            }
        };
        let result = self.actions.stop_recording(&recording_id).await;
        self.state = RecordingState::Idle;
        if result.is_ok() {
            info!("recording {recording_id} stopped");
        }
        result
    }

    /// Provider says recording ended (e.g. stopped server-side).
    pub fn sync_remote(&mut self, active: bool) {
        if !active && !matches!(self.state, RecordingState::Stopping) {
            self.state = RecordingState::Idle;
        }
    }
}
