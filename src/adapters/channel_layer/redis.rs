//! Redis-backed channel layer for multi-process deployments.
//!
//! Membership lives in Redis sets, one per group. Delivery uses PUBLISH to a
//! per-connection channel; each registered connection holds its own pub/sub
//! subscription whose messages are forwarded into the connection's inbox.
//!
//! Key layout (with the default `switchboard` prefix):
//!
//! ```text
//! switchboard:group:room1      SET of connection ids
//! switchboard:conn:<uuid>      pub/sub channel of one connection
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::domain::foundation::{ConnectionId, GroupName};
use crate::ports::{ChannelLayer, ChannelLayerError, ChannelMessage, Inbox};

fn backend(e: redis::RedisError) -> ChannelLayerError {
    ChannelLayerError::Backend(e.to_string())
}

/// Channel layer over Redis sets and pub/sub.
pub struct RedisChannelLayer {
    client: redis::Client,
    conn: MultiplexedConnection,
    prefix: String,
    inbox_capacity: usize,
    subscriptions: Mutex<HashMap<ConnectionId, JoinHandle<()>>>,
}

impl RedisChannelLayer {
    /// Connects to Redis, failing if the server is not reachable within `timeout`.
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        inbox_capacity: usize,
        timeout: Duration,
    ) -> Result<Self, ChannelLayerError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| ChannelLayerError::Backend(format!("Timed out connecting to {}", url)))?
            .map_err(backend)?;

        Ok(Self {
            client,
            conn,
            prefix: prefix.into(),
            inbox_capacity: inbox_capacity.max(1),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    fn group_key(&self, group: &GroupName) -> String {
        format!("{}:group:{}", self.prefix, group)
    }

    fn inbox_channel(&self, connection: ConnectionId) -> String {
        format!("{}:conn:{}", self.prefix, connection)
    }

    async fn publish(
        &self,
        connection: ConnectionId,
        payload: &str,
    ) -> Result<bool, ChannelLayerError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(self.inbox_channel(connection), payload)
            .await
            .map_err(backend)?;
        Ok(receivers > 0)
    }
}

fn encode(message: &ChannelMessage) -> Result<String, ChannelLayerError> {
    serde_json::to_string(message).map_err(|e| ChannelLayerError::Serialization(e.to_string()))
}

#[async_trait]
impl ChannelLayer for RedisChannelLayer {
    async fn register(&self, connection: ConnectionId) -> Result<Inbox, ChannelLayerError> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(&connection) {
            return Err(ChannelLayerError::AlreadyRegistered(connection));
        }

        let mut pubsub = self
            .client
            .get_async_connection()
            .await
            .map_err(backend)?
            .into_pubsub();
        pubsub
            .subscribe(self.inbox_channel(connection))
            .await
            .map_err(backend)?;

        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        let task = tokio::spawn(async move {
            let mut messages = Box::pin(pubsub.into_on_message());
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(connection_id = %connection, error = %e, "Unreadable pub/sub payload");
                        continue;
                    }
                };
                match serde_json::from_str::<ChannelMessage>(&payload) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(connection_id = %connection, error = %e, "Malformed channel message");
                    }
                }
            }
            tracing::debug!(connection_id = %connection, "Pub/sub forwarder stopped");
        });

        subscriptions.insert(connection, task);
        Ok(rx)
    }

    async fn unregister(&self, connection: ConnectionId) -> Result<(), ChannelLayerError> {
        if let Some(task) = self.subscriptions.lock().await.remove(&connection) {
            task.abort();
        }
        Ok(())
    }

    async fn join_group(
        &self,
        group: &GroupName,
        connection: ConnectionId,
    ) -> Result<(), ChannelLayerError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(self.group_key(group), connection.to_string())
            .await
            .map_err(backend)
    }

    async fn leave_group(
        &self,
        group: &GroupName,
        connection: ConnectionId,
    ) -> Result<(), ChannelLayerError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(self.group_key(group), connection.to_string())
            .await
            .map_err(backend)
    }

    async fn send_to_connection(&self, connection: ConnectionId, message: ChannelMessage) {
        let result = match encode(&message) {
            Ok(payload) => self.publish(connection, &payload).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(connection_id = %connection, "Send to unknown connection dropped");
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection, error = %e, "Send to connection failed");
            }
        }
    }

    async fn broadcast_to_group(
        &self,
        group: &GroupName,
        message: ChannelMessage,
        exclude: Option<ConnectionId>,
    ) -> Result<usize, ChannelLayerError> {
        let payload = encode(&message)?;
        let members = self.group_members(group).await?;

        let mut delivered = 0;
        for member in members.into_iter().filter(|id| Some(*id) != exclude) {
            match self.publish(member, &payload).await {
                Ok(true) => delivered += 1,
                Ok(false) => {
                    tracing::debug!(connection_id = %member, group = %group, "Group member has no subscriber");
                }
                Err(e) => {
                    tracing::warn!(connection_id = %member, group = %group, error = %e, "Broadcast delivery failed");
                }
            }
        }
        Ok(delivered)
    }

    async fn group_members(
        &self,
        group: &GroupName,
    ) -> Result<Vec<ConnectionId>, ChannelLayerError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.smembers(self.group_key(group)).await.map_err(backend)?;

        let mut members: Vec<ConnectionId> = raw
            .iter()
            .filter_map(|id| match id.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(group = %group, member = %id, "Ignoring malformed group member");
                    None
                }
            })
            .collect();
        members.sort();
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    // Exercising this adapter needs a running Redis server:
    //
    //     let layer = RedisChannelLayer::connect(
    //         "redis://127.0.0.1/", "test", 16, Duration::from_secs(1),
    //     ).await.unwrap();
    //     let inbox = layer.register(id).await.unwrap();

    use super::*;

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let result =
            RedisChannelLayer::connect("not-a-url", "test", 16, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ChannelLayerError::Backend(_))));
    }
}
