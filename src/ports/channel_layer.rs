//! ChannelLayer port - Group membership and fan-out between connections.
//!
//! Every connection registers an inbox with the channel layer when it opens.
//! Messages published to a group, to a single connection, or as events land
//! in that inbox and are forwarded to the socket by the connection's
//! dispatcher. Backends are interchangeable: callers never branch on which
//! one is active.
//!
//! ## Delivery semantics
//!
//! - Per-recipient order equals enqueue order
//! - No ordering across recipients
//! - Sends to unknown or vanished connections are logged and dropped

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::foundation::{ConnectionId, GroupName};
use crate::domain::protocol::Envelope;

/// What the dispatcher does with a delivered envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "envelope", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Forwarded to the socket, followed by a group completion sentinel.
    Broadcast(Envelope),
    /// Forwarded to the socket as is.
    Direct(Envelope),
    /// Decoded against the consumer's event kinds and handled.
    Event(Envelope),
}

impl ChannelMessage {
    pub fn envelope(&self) -> &Envelope {
        match self {
            ChannelMessage::Broadcast(envelope)
            | ChannelMessage::Direct(envelope)
            | ChannelMessage::Event(envelope) => envelope,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChannelMessage::Broadcast(_) => "broadcast",
            ChannelMessage::Direct(_) => "direct",
            ChannelMessage::Event(_) => "event",
        }
    }
}

/// Receiving end of a connection's channel-layer inbox.
pub type Inbox = mpsc::Receiver<ChannelMessage>;

/// Errors raised by channel-layer backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelLayerError {
    /// Backend communication failure.
    #[error("Channel layer backend error: {0}")]
    Backend(String),

    /// A message could not be encoded or decoded for transport.
    #[error("Channel layer serialization error: {0}")]
    Serialization(String),

    /// The connection already has an inbox.
    #[error("Connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// No backend is registered under the alias.
    #[error("No channel layer registered under alias '{0}'")]
    UnknownAlias(String),
}

impl ChannelLayerError {
    /// Returns true if retrying may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelLayerError::Backend(_))
    }
}

/// Backend-agnostic group membership and delivery.
///
/// `join_group` and `leave_group` are idempotent; leaving a group the
/// connection never joined is a no-op.
#[async_trait]
pub trait ChannelLayer: Send + Sync {
    /// Creates the inbox for a connection.
    async fn register(&self, connection: ConnectionId) -> Result<Inbox, ChannelLayerError>;

    /// Drops the inbox. Unknown connections are ignored.
    async fn unregister(&self, connection: ConnectionId) -> Result<(), ChannelLayerError>;

    async fn join_group(
        &self,
        group: &GroupName,
        connection: ConnectionId,
    ) -> Result<(), ChannelLayerError>;

    async fn leave_group(
        &self,
        group: &GroupName,
        connection: ConnectionId,
    ) -> Result<(), ChannelLayerError>;

    /// Point-to-point delivery. Failures are logged, never returned.
    async fn send_to_connection(&self, connection: ConnectionId, message: ChannelMessage);

    /// Delivers to every member except `exclude`. Returns the number of
    /// recipients the message was handed to.
    async fn broadcast_to_group(
        &self,
        group: &GroupName,
        message: ChannelMessage,
        exclude: Option<ConnectionId>,
    ) -> Result<usize, ChannelLayerError>;

    /// Current members in id order.
    async fn group_members(&self, group: &GroupName)
        -> Result<Vec<ConnectionId>, ChannelLayerError>;
}
