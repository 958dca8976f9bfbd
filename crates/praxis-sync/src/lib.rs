pub mod listener;
pub mod presence;
pub mod store;
pub mod typing;

pub use listener::{ChangeFeedListener, ListenerHandle};
pub use presence::{PresenceConfig, PresenceTracker, PresenceWriter};
pub use store::{ReconcilingStore, UpsertOutcome};
pub use typing::{TypingCoordinator, typing_banner};
