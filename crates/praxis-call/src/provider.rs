use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use praxis_types::call::{Participant, TranscriptSegment};

use crate::error::ProviderError;

/// Observable state changes emitted by the video-session provider.
///
/// This is the whole surface the core consumes: participant membership,
/// per-participant media flags, the periodic network score, recording
/// state and live transcript segments. Codec negotiation, NAT traversal
/// and the rest of the transport stay behind the provider.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    ParticipantJoined { participant: Participant },
    ParticipantLeft { participant_id: String },
    AudioUpdate { participant_id: String, enabled: bool },
    VideoUpdate { participant_id: String, enabled: bool },
    ScreenShareUpdate { participant_id: String, enabled: bool },
    /// 0-5, -1 = unknown
    NetworkQualityUpdate { score: i8 },
    RecordingUpdate { active: bool },
    Transcript { segment: TranscriptSegment },
}

/// Narrow seam over the concrete video SDK so the call controller can be
/// driven against a fake in tests.
#[async_trait]
pub trait MeetingProvider: Send + Sync {
    /// Join a meeting with the caller-selected initial device defaults.
    async fn join(
        &self,
        meeting_id: &str,
        audio: bool,
        video: bool,
    ) -> Result<Arc<dyn SessionHandle>, ProviderError>;
}

/// A live provider session: the `self`/`participants` collections are
/// observed through [`SessionHandle::events`], commands go through the
/// imperative methods.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    fn events(&self) -> broadcast::Receiver<ProviderEvent>;

    /// Snapshot of the local participant at join time.
    fn self_participant(&self) -> Participant;

    async fn set_audio(&self, enabled: bool) -> Result<(), ProviderError>;
    async fn set_video(&self, enabled: bool) -> Result<(), ProviderError>;
    async fn set_screenshare(&self, enabled: bool) -> Result<(), ProviderError>;
    async fn leave(&self) -> Result<(), ProviderError>;
}
