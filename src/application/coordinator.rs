//! Broadcast coordinator - routes group traffic to channel-layer backends.
//!
//! Backends are registered under aliases; a [`BroadcastTarget`] names the
//! group, an optional excluded connection, and the alias to route through.
//! Code that publishes never knows which backend is behind an alias.
//!
//! ```text
//! ctx.broadcast(room1) ─► BroadcastCoordinator ─► ChannelLayers["default"] ─► members of room1
//!                                             └► ChannelLayers["redis"]
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::foundation::{ConnectionId, GroupName};
use crate::domain::protocol::Envelope;
use crate::ports::{ChannelLayer, ChannelLayerError, ChannelMessage};

/// Alias used when a consumer does not pick one.
pub const DEFAULT_LAYER_ALIAS: &str = "default";

/// Channel-layer backends by alias.
#[derive(Clone, Default)]
pub struct ChannelLayers {
    layers: BTreeMap<String, Arc<dyn ChannelLayer>>,
}

impl ChannelLayers {
    /// Registry with `layer` under [`DEFAULT_LAYER_ALIAS`].
    pub fn new(layer: Arc<dyn ChannelLayer>) -> Self {
        Self::default().with_layer(DEFAULT_LAYER_ALIAS, layer)
    }

    /// Adds or replaces the backend for `alias`.
    pub fn with_layer(mut self, alias: impl Into<String>, layer: Arc<dyn ChannelLayer>) -> Self {
        self.layers.insert(alias.into(), layer);
        self
    }

    pub fn get(&self, alias: &str) -> Result<&Arc<dyn ChannelLayer>, ChannelLayerError> {
        self.layers
            .get(alias)
            .ok_or_else(|| ChannelLayerError::UnknownAlias(alias.to_string()))
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ChannelLayers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLayers")
            .field("aliases", &self.layers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Where a group message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTarget {
    pub group: GroupName,
    pub exclude: Option<ConnectionId>,
    pub alias: String,
}

impl BroadcastTarget {
    /// Every member of `group` on the default backend.
    pub fn new(group: GroupName) -> Self {
        Self {
            group,
            exclude: None,
            alias: DEFAULT_LAYER_ALIAS.to_string(),
        }
    }

    pub fn excluding(mut self, connection: ConnectionId) -> Self {
        self.exclude = Some(connection);
        self
    }

    pub fn via(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }
}

/// Entry point for group membership and fan-out.
#[derive(Debug, Clone)]
pub struct BroadcastCoordinator {
    layers: ChannelLayers,
}

impl BroadcastCoordinator {
    pub fn new(layers: ChannelLayers) -> Self {
        Self { layers }
    }

    pub fn layer(&self, alias: &str) -> Result<Arc<dyn ChannelLayer>, ChannelLayerError> {
        self.layers.get(alias).map(Arc::clone)
    }

    pub fn layers(&self) -> &ChannelLayers {
        &self.layers
    }

    pub async fn join_group(
        &self,
        alias: &str,
        group: &GroupName,
        connection: ConnectionId,
    ) -> Result<(), ChannelLayerError> {
        self.layers.get(alias)?.join_group(group, connection).await?;
        tracing::debug!(connection_id = %connection, group = %group, alias, "Joined group");
        Ok(())
    }

    pub async fn leave_group(
        &self,
        alias: &str,
        group: &GroupName,
        connection: ConnectionId,
    ) -> Result<(), ChannelLayerError> {
        self.layers.get(alias)?.leave_group(group, connection).await?;
        tracing::debug!(connection_id = %connection, group = %group, alias, "Left group");
        Ok(())
    }

    /// Publishes a group broadcast. Recipients forward it to their socket.
    pub async fn broadcast(
        &self,
        target: &BroadcastTarget,
        envelope: Envelope,
    ) -> Result<usize, ChannelLayerError> {
        self.publish(target, ChannelMessage::Broadcast(envelope)).await
    }

    /// Publishes an event. Recipients run their event handler for it.
    ///
    /// Usable from outside any connection (HTTP handlers, background jobs).
    pub async fn send_event(
        &self,
        target: &BroadcastTarget,
        envelope: Envelope,
    ) -> Result<usize, ChannelLayerError> {
        self.publish(target, ChannelMessage::Event(envelope)).await
    }

    /// Point-to-point delivery. Unknown aliases and connections are logged.
    pub async fn send_to_connection(&self, alias: &str, connection: ConnectionId, envelope: Envelope) {
        match self.layers.get(alias) {
            Ok(layer) => {
                layer
                    .send_to_connection(connection, ChannelMessage::Direct(envelope))
                    .await
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection, error = %e, "Direct send dropped");
            }
        }
    }

    async fn publish(
        &self,
        target: &BroadcastTarget,
        message: ChannelMessage,
    ) -> Result<usize, ChannelLayerError> {
        let kind = message.kind();
        let action = message.envelope().action.clone();
        let delivered = self
            .layers
            .get(&target.alias)?
            .broadcast_to_group(&target.group, message, target.exclude)
            .await?;
        tracing::debug!(
            group = %target.group,
            alias = %target.alias,
            kind,
            action = %action,
            delivered,
            "Published to group"
        );
        Ok(delivered)
    }
}
