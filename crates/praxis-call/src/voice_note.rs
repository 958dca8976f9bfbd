use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

use praxis_types::models::AttachmentData;

use crate::error::PermissionError;

/// A selectable audio input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub label: String,
}

/// Raw bytes handed back by the platform recorder when a capture stops.
#[derive(Debug, Clone)]
pub struct CapturedAudio {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// A finished voice message, ready to attach to an outgoing message.
#[derive(Debug, Clone)]
pub struct VoiceNote {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub duration_ms: u64,
}

impl VoiceNote {
    /// Attachment metadata for the voice-message placeholder, once the
    /// bytes have been uploaded and a url assigned.
    pub fn into_attachment(self, url: impl Into<String>) -> AttachmentData {
        AttachmentData {
            url: url.into(),
            mime_type: self.mime_type,
            size_bytes: self.data.len() as u64,
            duration_ms: Some(self.duration_ms),
        }
    }
}

/// Seam over the platform's microphone capture so the recorder can be
/// tested without real devices.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<AudioDevice>, PermissionError>;

    /// Open a capture stream on the given device, or the default when
    /// `None`. Denied permission surfaces here.
    async fn acquire(&self, device_id: Option<&str>)
        -> Result<Box<dyn CaptureStream>, PermissionError>;
}

/// One live capture. Dropping it without `stop` discards the audio.
#[async_trait]
pub trait CaptureStream: Send {
    async fn stop(self: Box<Self>) -> Result<CapturedAudio, PermissionError>;
}

#[derive(Debug, Error)]
pub enum VoiceNoteError {
    #[error("a voice note is already being recorded")]
    AlreadyRecording,

    #[error("no voice note is being recorded")]
    NotRecording,

    #[error(transparent)]
    Permission(#[from] PermissionError),
}

/// Drives one voice-note capture at a time: start, then either finish
/// (yielding the note with its measured duration) or cancel (dropping the
/// audio).
pub struct VoiceNoteRecorder {
    capture: Arc<dyn MediaCapture>,
    active: Option<ActiveCapture>,
}

struct ActiveCapture {
    stream: Box<dyn CaptureStream>,
    started_at: Instant,
}

impl VoiceNoteRecorder {
    pub fn new(capture: Arc<dyn MediaCapture>) -> Self {
        Self { capture, active: None }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Elapsed recording time, for the in-progress UI timer.
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.active
            .as_ref()
            .map(|a| a.started_at.elapsed().as_millis() as u64)
    }

    pub async fn devices(&self) -> Result<Vec<AudioDevice>, PermissionError> {
        self.capture.list_devices().await
    }

    pub async fn start(&mut self, device_id: Option<&str>) -> Result<(), VoiceNoteError> {
        if self.active.is_some() {
            return Err(VoiceNoteError::AlreadyRecording);
        }
        let stream = self.capture.acquire(device_id).await?;
        self.active = Some(ActiveCapture { stream, started_at: Instant::now() });
        Ok(())
    }

    /// Stop and keep the audio.
    pub async fn finish(&mut self) -> Result<VoiceNote, VoiceNoteError> {
        let ActiveCapture { stream, started_at } =
            self.active.take().ok_or(VoiceNoteError::NotRecording)?;
        let duration_ms = started_at.elapsed().as_millis() as u64;
        let captured = stream.stop().await?;
        info!(
            "voice note captured: {} bytes over {duration_ms}ms",
            captured.data.len()
        );
        Ok(VoiceNote {
            data: captured.data,
            mime_type: captured.mime_type,
            duration_ms,
        })
    }

    /// Stop and discard the audio. No-op when idle.
    pub fn cancel(&mut self) {
        self.active = None;
    }
}
