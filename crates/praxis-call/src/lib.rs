pub mod actions;
pub mod controller;
pub mod error;
pub mod provider;
pub mod quality;
pub mod recording;
pub mod screenshare;
pub mod transcript;
pub mod voice_note;

pub use actions::ActionLayer;
pub use controller::{CallConfig, CallController, CallState, OpenRequest};
pub use error::{BackendRpcError, CallError, ConflictError, PermissionError, ProviderError};
pub use provider::{MeetingProvider, ProviderEvent, SessionHandle};
pub use quality::{QualityAction, QualityConfig, QualitySuggestion};
pub use recording::{RecordingDecision, RecordingGate};
pub use screenshare::ScreenshareArbiter;
pub use transcript::TranscriptCapture;
pub use voice_note::{
    AudioDevice, CaptureStream, CapturedAudio, MediaCapture, VoiceNote, VoiceNoteError,
    VoiceNoteRecorder,
};
