//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the dispatcher and the outside world. Adapters implement these ports.
//!
//! - `Authenticator` - Resolves the principal of a connection
//! - `FrameReceiver` / `FrameSender` - Split socket transport
//! - `ChannelLayer` - Group membership and cross-connection delivery

mod authenticator;
mod channel_layer;
mod transport;

pub use authenticator::Authenticator;
pub use channel_layer::{ChannelLayer, ChannelLayerError, ChannelMessage, Inbox};
pub use transport::{
    ConnectionMetadata, Frame, FrameReceiver, FrameSender, TransportError,
    CLOSE_AUTHENTICATION_FAILED, CLOSE_INTERNAL_ERROR, CLOSE_NORMAL,
};
