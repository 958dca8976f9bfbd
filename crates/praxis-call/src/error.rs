use thiserror::Error;

/// Video-session provider failures. Fatal to the current session attempt;
/// the caller retries by re-opening.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected the join: {0}")]
    JoinRejected(String),

    #[error("device failure: {0}")]
    Device(String),

    #[error("provider session lost: {0}")]
    SessionLost(String),
}

/// Device/media access denied by the platform. Surfaced to the user with
/// remediation guidance.
#[derive(Debug, Error)]
#[error("media permission denied: {0}")]
pub struct PermissionError(pub String);

/// Screenshare requested while another participant holds it. Refused
/// locally and silently; the UI shows a disabled state instead.
#[derive(Debug, Error)]
#[error("screenshare already owned by {owner}")]
pub struct ConflictError {
    pub owner: String,
}

/// A backend action-layer call failed. Recoverable by policy: logged and
/// surfaced, never aborts teardown.
#[derive(Debug, Error)]
#[error("backend call {call} failed: {reason}")]
pub struct BackendRpcError {
    pub call: &'static str,
    pub reason: String,
}

impl BackendRpcError {
    pub fn new(call: &'static str, reason: impl Into<String>) -> Self {
        Self { call, reason: reason.into() }
    }
}

/// Errors establishing or driving a call session.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("no call credential supplied")]
    MissingCredential,

    #[error("a session is already open")]
    AlreadyOpen,

    #[error("no active session")]
    NotActive,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Backend(#[from] BackendRpcError),
}
