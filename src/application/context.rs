//! Per-invocation handler context.
//!
//! A fresh [`HandlerContext`] is handed to every handler call. It carries the
//! connection's identity and state, an outbox feeding the connection's writer,
//! and the broadcast coordinator. Group membership of the connection changes
//! only through [`HandlerContext::join`] and [`HandlerContext::leave`], which
//! record every change in the dispatcher-owned [`Membership`] so teardown can
//! undo all of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, MutexGuard, RwLock};

use crate::domain::foundation::{ConnectionId, GroupName, Principal};
use crate::domain::protocol::{Envelope, Message};

use super::coordinator::{BroadcastCoordinator, BroadcastTarget};
use super::handler::HandlerError;

/// Commands consumed by a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outbound {
    Frame(Envelope),
    /// End of a processing cycle; buffered frames may be written.
    Flush,
    Close { code: u16, reason: String },
}

/// Observations about one processing cycle.
#[derive(Debug, Default)]
pub(crate) struct CycleFlags {
    broadcast: AtomicBool,
}

impl CycleFlags {
    pub(crate) fn broadcast_issued(&self) -> bool {
        self.broadcast.load(Ordering::Acquire)
    }

    fn mark_broadcast(&self) {
        self.broadcast.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct MembershipState {
    groups: Vec<GroupName>,
    closed: bool,
}

/// Groups one connection belongs to, in join order.
///
/// Once closed by teardown the set stays empty and refuses further joins.
#[derive(Debug, Default)]
pub(crate) struct Membership {
    state: RwLock<MembershipState>,
}

impl Membership {
    pub(crate) fn new(groups: Vec<GroupName>) -> Self {
        Self {
            state: RwLock::new(MembershipState {
                groups,
                closed: false,
            }),
        }
    }

    pub(crate) async fn snapshot(&self) -> Vec<GroupName> {
        self.state.read().await.groups.clone()
    }

    pub(crate) async fn contains(&self, group: &GroupName) -> bool {
        self.state.read().await.groups.contains(group)
    }

    /// Empties the set and marks it closed. Returns the groups to leave;
    /// later calls return nothing.
    pub(crate) async fn close(&self) -> Vec<GroupName> {
        let mut state = self.state.write().await;
        state.closed = true;
        std::mem::take(&mut state.groups)
    }
}

/// Everything a handler may touch.
pub struct HandlerContext<S> {
    connection_id: ConnectionId,
    principal: Arc<Principal>,
    membership: Arc<Membership>,
    state: Arc<Mutex<S>>,
    layer_alias: Arc<str>,
    coordinator: Arc<BroadcastCoordinator>,
    outbox: mpsc::Sender<Outbound>,
    cycle: Arc<CycleFlags>,
}

impl<S> Clone for HandlerContext<S> {
    fn clone(&self) -> Self {
        Self {
            connection_id: self.connection_id,
            principal: Arc::clone(&self.principal),
            membership: Arc::clone(&self.membership),
            state: Arc::clone(&self.state),
            layer_alias: Arc::clone(&self.layer_alias),
            coordinator: Arc::clone(&self.coordinator),
            outbox: self.outbox.clone(),
            cycle: Arc::clone(&self.cycle),
        }
    }
}

impl<S> HandlerContext<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        connection_id: ConnectionId,
        principal: Arc<Principal>,
        membership: Arc<Membership>,
        state: Arc<Mutex<S>>,
        layer_alias: Arc<str>,
        coordinator: Arc<BroadcastCoordinator>,
        outbox: mpsc::Sender<Outbound>,
        cycle: Arc<CycleFlags>,
    ) -> Self {
        Self {
            connection_id,
            principal,
            membership,
            state,
            layer_alias,
            coordinator,
            outbox,
            cycle,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Groups the connection currently belongs to.
    pub async fn groups(&self) -> Vec<GroupName> {
        self.membership.snapshot().await
    }

    pub async fn is_member(&self, group: &GroupName) -> bool {
        self.membership.contains(group).await
    }

    /// Adds this connection to `group`. The group is left again on teardown.
    pub async fn join(&self, group: &GroupName) -> Result<(), HandlerError> {
        let mut membership = self.membership.state.write().await;
        if membership.closed {
            return Err(HandlerError::fatal("Connection is closed"));
        }
        if membership.groups.contains(group) {
            return Ok(());
        }
        self.coordinator
            .join_group(&self.layer_alias, group, self.connection_id)
            .await?;
        membership.groups.push(group.clone());
        Ok(())
    }

    /// Removes this connection from `group`. Leaving a group it is not in is a no-op.
    pub async fn leave(&self, group: &GroupName) -> Result<(), HandlerError> {
        let mut membership = self.membership.state.write().await;
        let Some(index) = membership.groups.iter().position(|g| g == group) else {
            return Ok(());
        };
        self.coordinator
            .leave_group(&self.layer_alias, group, self.connection_id)
            .await?;
        membership.groups.remove(index);
        Ok(())
    }

    /// Locks the connection's state. Frames of one connection are handled
    /// one at a time, so the lock is never contended by sibling handlers.
    pub async fn state(&self) -> MutexGuard<'_, S> {
        self.state.lock().await
    }

    /// Sends a message to this connection. Waits while the outbox is full.
    pub async fn send<M: Message>(&self, message: &M) -> Result<(), HandlerError> {
        self.send_envelope(Envelope::from_message(message)?).await;
        Ok(())
    }

    /// Sends a pre-built envelope to this connection. Dropped with a log
    /// line if the connection is already shutting down.
    pub async fn send_envelope(&self, envelope: Envelope) {
        if self.outbox.send(Outbound::Frame(envelope)).await.is_err() {
            tracing::debug!(connection_id = %self.connection_id, "Outbox closed, send dropped");
        }
    }

    /// Broadcasts to every member of `group`, this connection included.
    pub async fn broadcast<M: Message>(
        &self,
        group: &GroupName,
        message: &M,
    ) -> Result<usize, HandlerError> {
        self.broadcast_to(&self.target(group), message).await
    }

    /// Broadcasts to every member of `group` except this connection.
    pub async fn broadcast_to_others<M: Message>(
        &self,
        group: &GroupName,
        message: &M,
    ) -> Result<usize, HandlerError> {
        let target = self.target(group).excluding(self.connection_id);
        self.broadcast_to(&target, message).await
    }

    /// Broadcasts to an explicit target.
    pub async fn broadcast_to<M: Message>(
        &self,
        target: &BroadcastTarget,
        message: &M,
    ) -> Result<usize, HandlerError> {
        let envelope = Envelope::from_message(message)?;
        let delivered = self.coordinator.broadcast(target, envelope).await?;
        self.cycle.mark_broadcast();
        Ok(delivered)
    }

    /// Publishes an event to `group`; members run their event handler.
    pub async fn send_event<M: Message>(
        &self,
        group: &GroupName,
        message: &M,
    ) -> Result<usize, HandlerError> {
        let envelope = Envelope::from_message(message)?;
        Ok(self.coordinator.send_event(&self.target(group), envelope).await?)
    }

    /// Point-to-point message to another connection.
    pub async fn send_to<M: Message>(
        &self,
        connection: ConnectionId,
        message: &M,
    ) -> Result<(), HandlerError> {
        let envelope = Envelope::from_message(message)?;
        self.coordinator
            .send_to_connection(&self.layer_alias, connection, envelope)
            .await;
        Ok(())
    }

    fn target(&self, group: &GroupName) -> BroadcastTarget {
        BroadcastTarget::new(group.clone()).via(self.layer_alias.as_ref())
    }
}
