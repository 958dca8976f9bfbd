pub mod error;
pub mod feed;
pub mod hub;

pub use error::TransportError;
pub use feed::{ChangeFeed, LocalChangeFeed};
pub use hub::SignalHub;
