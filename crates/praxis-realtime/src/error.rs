use thiserror::Error;

use praxis_types::events::ConnectionState;

/// Subscribe/publish failures on the realtime transport. These are reported
/// as a connection-state signal; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("subscription rejected: {0}")]
    SubscribeRejected(String),

    #[error("transport timed out")]
    Timeout,

    #[error("transport channel closed")]
    ChannelClosed,
}

impl TransportError {
    pub fn connection_state(&self) -> ConnectionState {
        match self {
            TransportError::SubscribeRejected(_) => ConnectionState::Error,
            TransportError::Timeout => ConnectionState::TimedOut,
            TransportError::ChannelClosed => ConnectionState::Closed,
        }
    }
}
