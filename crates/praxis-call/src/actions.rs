use async_trait::async_trait;

use crate::error::BackendRpcError;

/// Opaque backend RPCs around a call's lifecycle. Each call can fail
/// independently; everything here is recoverable except the initial
/// `join_call`, which blocks session establishment.
#[async_trait]
pub trait ActionLayer: Send + Sync {
    async fn join_call(&self, call_id: i64) -> Result<(), BackendRpcError>;
    async fn leave_call(&self, call_id: i64) -> Result<(), BackendRpcError>;

    /// Starts a server-side recording; returns the recording id used for an
    /// unambiguous stop even across multiple start/stop cycles.
    async fn start_recording(&self, meeting_id: &str) -> Result<String, BackendRpcError>;
    async fn stop_recording(&self, recording_id: &str) -> Result<(), BackendRpcError>;

    async fn save_transcript(&self, call_id: i64, text: &str) -> Result<(), BackendRpcError>;
    async fn save_recording_url(
        &self,
        call_id: i64,
        recording_id: &str,
    ) -> Result<(), BackendRpcError>;
}
