//! In-process channel layer.
//!
//! Each registered connection owns a bounded tokio mpsc inbox. Groups are
//! sets of connection ids behind a `RwLock`.
//!
//! ```text
//! Group: room1          Inboxes
//! ├── conn-a  ───────►  conn-a: [msg1, msg2]
//! └── conn-b  ───────►  conn-b: [msg1]
//! ```

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use crate::domain::foundation::{ConnectionId, GroupName};
use crate::ports::{ChannelLayer, ChannelLayerError, ChannelMessage, Inbox};

/// Default inbox capacity per connection.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Channel layer for single-process deployments and tests.
///
/// A full inbox drops the message with a warning instead of blocking the
/// sender, so one slow connection cannot stall a broadcast.
pub struct InMemoryChannelLayer {
    inboxes: RwLock<HashMap<ConnectionId, mpsc::Sender<ChannelMessage>>>,
    groups: RwLock<HashMap<GroupName, BTreeSet<ConnectionId>>>,
    inbox_capacity: usize,
}

impl InMemoryChannelLayer {
    pub fn new(inbox_capacity: usize) -> Self {
        Self {
            inboxes: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            inbox_capacity: inbox_capacity.max(1),
        }
    }

    /// Number of groups with at least one member.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Number of registered inboxes.
    pub async fn connection_count(&self) -> usize {
        self.inboxes.read().await.len()
    }

    fn deliver(
        connection: ConnectionId,
        sender: &mpsc::Sender<ChannelMessage>,
        message: ChannelMessage,
    ) -> bool {
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                tracing::warn!(
                    connection_id = %connection,
                    action = %message.envelope().action,
                    "Inbox full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(connection_id = %connection, "Inbox closed, dropping message");
                false
            }
        }
    }
}

impl Default for InMemoryChannelLayer {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAPACITY)
    }
}

#[async_trait]
impl ChannelLayer for InMemoryChannelLayer {
    async fn register(&self, connection: ConnectionId) -> Result<Inbox, ChannelLayerError> {
        let mut inboxes = self.inboxes.write().await;
        if inboxes.contains_key(&connection) {
            return Err(ChannelLayerError::AlreadyRegistered(connection));
        }
        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        inboxes.insert(connection, tx);
        Ok(rx)
    }

    async fn unregister(&self, connection: ConnectionId) -> Result<(), ChannelLayerError> {
        self.inboxes.write().await.remove(&connection);
        Ok(())
    }

    async fn join_group(
        &self,
        group: &GroupName,
        connection: ConnectionId,
    ) -> Result<(), ChannelLayerError> {
        self.groups
            .write()
            .await
            .entry(group.clone())
            .or_default()
            .insert(connection);
        Ok(())
    }

    async fn leave_group(
        &self,
        group: &GroupName,
        connection: ConnectionId,
    ) -> Result<(), ChannelLayerError> {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            members.remove(&connection);
            if members.is_empty() {
                groups.remove(group);
            }
        }
        Ok(())
    }

    async fn send_to_connection(&self, connection: ConnectionId, message: ChannelMessage) {
        let sender = self.inboxes.read().await.get(&connection).cloned();
        match sender {
            Some(sender) => {
                Self::deliver(connection, &sender, message);
            }
            None => {
                tracing::debug!(
                    connection_id = %connection,
                    "Send to unknown connection dropped"
                );
            }
        }
    }

    async fn broadcast_to_group(
        &self,
        group: &GroupName,
        message: ChannelMessage,
        exclude: Option<ConnectionId>,
    ) -> Result<usize, ChannelLayerError> {
        // Snapshot recipients so no lock is held while delivering.
        let recipients: Vec<(ConnectionId, mpsc::Sender<ChannelMessage>)> = {
            let groups = self.groups.read().await;
            let Some(members) = groups.get(group) else {
                return Ok(0);
            };
            let inboxes = self.inboxes.read().await;
            members
                .iter()
                .filter(|id| Some(**id) != exclude)
                .filter_map(|id| inboxes.get(id).map(|tx| (*id, tx.clone())))
                .collect()
        };

        let delivered = recipients
            .iter()
            .filter(|(id, tx)| Self::deliver(*id, tx, message.clone()))
            .count();
        Ok(delivered)
    }

    async fn group_members(
        &self,
        group: &GroupName,
    ) -> Result<Vec<ConnectionId>, ChannelLayerError> {
        Ok(self
            .groups
            .read()
            .await
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }
}
