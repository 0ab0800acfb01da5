//! Connection dispatcher - drives one connection from accept to close.
//!
//! ## Lifecycle
//!
//! ```text
//! Connecting ─► Authenticating ─► Open ─► Closing ─► Closed
//!                     │                      ▲
//!                     └── auth failed (4003) ┘
//! ```
//!
//! ## Tasks per connection
//!
//! - a reader task feeding inbound frames through a bounded channel
//! - a writer task owning the socket sink and the flush policy, fed through
//!   a bounded outbox so a slow socket holds back the inbox
//! - the dispatcher loop itself, which handles one frame or one
//!   channel-layer delivery at a time
//!
//! Every processing cycle ends with at most one completion sentinel.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::Instrument;

use crate::domain::foundation::{
    ConnectionId, ConnectionState, DomainError, GroupName, Principal, StateMachine,
};
use crate::domain::protocol::{
    CompletionKind, Direction, Envelope, ErrorEntry, FrameError, PathSegment, RawEnvelope,
    DEFAULT_DISCRIMINATOR_FIELD,
};
use crate::ports::{
    Authenticator, ChannelLayer, ChannelMessage, ConnectionMetadata, Frame, FrameReceiver,
    FrameSender, Inbox, CLOSE_AUTHENTICATION_FAILED, CLOSE_INTERNAL_ERROR, CLOSE_NORMAL,
};

use super::builder::{ChannelDescriptor, ConsumerSpec};
use super::context::{CycleFlags, HandlerContext, Membership, Outbound};
use super::coordinator::BroadcastCoordinator;
use super::handler::{BoxFuture, HandlerError, HandlerResult, Reply};

/// When queued outbound frames reach the socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Each frame is written as soon as it is issued.
    #[default]
    Immediate,
    /// Frames are buffered and written when the cycle ends.
    EndOfCycle,
}

/// Per-dispatcher protocol settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Envelope key holding the discriminator.
    pub discriminator_field: String,
    /// Emit a completion sentinel after every cycle.
    pub send_completion: bool,
    /// Emit an `authentication` status frame after authenticating.
    pub send_authentication_message: bool,
    pub flush: FlushMode,
    /// Log inbound and outbound envelopes at debug level.
    pub log_messages: bool,
    pub ignored_log_actions: BTreeSet<String>,
    /// Inbound frames buffered between the reader task and the dispatcher.
    pub inbound_buffer: usize,
    /// Commands queued for the writer task. When full, handlers and
    /// channel-layer deliveries wait, and the inbox backs up.
    pub outbound_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            discriminator_field: DEFAULT_DISCRIMINATOR_FIELD.to_string(),
            send_completion: false,
            send_authentication_message: false,
            flush: FlushMode::Immediate,
            log_messages: false,
            ignored_log_actions: BTreeSet::new(),
            inbound_buffer: 64,
            outbound_buffer: 64,
        }
    }
}

impl DispatcherConfig {
    fn logs(&self, action: &str) -> bool {
        self.log_messages && !self.ignored_log_actions.contains(action)
    }

    fn log_envelope(&self, direction: &'static str, envelope: &Envelope) {
        if self.logs(&envelope.action) {
            tracing::debug!(
                direction,
                action = %envelope.action,
                payload = %envelope.payload,
                "Message"
            );
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOutcome {
    pub connection_id: ConnectionId,
    /// Close code the server sent, if the close frame was written.
    pub close_code: Option<u16>,
    /// Handler invocations performed.
    pub cycles: u64,
}

enum Flow {
    Continue,
    Stop,
}

/// Runs connections of one consumer.
pub struct ConnectionDispatcher<S> {
    spec: Arc<ConsumerSpec<S>>,
    authenticator: Arc<dyn Authenticator>,
    coordinator: Arc<BroadcastCoordinator>,
    config: Arc<DispatcherConfig>,
}

impl<S> Clone for ConnectionDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            spec: Arc::clone(&self.spec),
            authenticator: Arc::clone(&self.authenticator),
            coordinator: Arc::clone(&self.coordinator),
            config: Arc::clone(&self.config),
        }
    }
}

/// Runtime state of one open connection.
struct Connection<S> {
    id: ConnectionId,
    principal: Arc<Principal>,
    membership: Arc<Membership>,
    state: Arc<Mutex<S>>,
    layer_alias: Arc<str>,
    outbox: mpsc::Sender<Outbound>,
    peer_closed: watch::Receiver<bool>,
    cycles: u64,
}

impl<S> Connection<S> {
    async fn send(&self, envelope: Envelope) {
        // The writer only goes away after the dispatcher loop ends.
        let _ = self.outbox.send(Outbound::Frame(envelope)).await;
    }

    async fn flush(&self) {
        let _ = self.outbox.send(Outbound::Flush).await;
    }

    async fn close(&self, code: u16, reason: &str) {
        let _ = self
            .outbox
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .await;
    }

    fn context(&self, coordinator: &Arc<BroadcastCoordinator>, cycle: Arc<CycleFlags>) -> HandlerContext<S> {
        HandlerContext::new(
            self.id,
            Arc::clone(&self.principal),
            Arc::clone(&self.membership),
            Arc::clone(&self.state),
            Arc::clone(&self.layer_alias),
            Arc::clone(coordinator),
            self.outbox.clone(),
            cycle,
        )
    }
}

impl<S: Send + 'static> ConnectionDispatcher<S> {
    pub fn new(
        spec: Arc<ConsumerSpec<S>>,
        authenticator: Arc<dyn Authenticator>,
        coordinator: Arc<BroadcastCoordinator>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            spec,
            authenticator,
            coordinator,
            config: Arc::new(config),
        }
    }

    pub fn spec(&self) -> &Arc<ConsumerSpec<S>> {
        &self.spec
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Serves one connection until either side closes it.
    pub async fn run<R, W>(
        &self,
        metadata: ConnectionMetadata,
        receiver: R,
        sender: W,
    ) -> ConnectionOutcome
    where
        R: FrameReceiver + 'static,
        W: FrameSender + 'static,
    {
        let connection_id = ConnectionId::new();
        let span = tracing::info_span!(
            "connection",
            connection_id = %connection_id,
            consumer = %self.spec.identity(),
        );
        self.serve(connection_id, metadata, receiver, sender)
            .instrument(span)
            .await
    }

    async fn serve<R, W>(
        &self,
        id: ConnectionId,
        metadata: ConnectionMetadata,
        receiver: R,
        sender: W,
    ) -> ConnectionOutcome
    where
        R: FrameReceiver + 'static,
        W: FrameSender + 'static,
    {
        let (outbox, outbox_rx) = mpsc::channel(self.config.outbound_buffer.max(1));
        let writer = tokio::spawn(
            write_loop(sender, outbox_rx, Arc::clone(&self.config)).in_current_span(),
        );
        let started = tokio::time::Instant::now();

        let mut lifecycle = advance(ConnectionState::Connecting, ConnectionState::Authenticating);

        let principal = match self.authenticator.authenticate(&metadata).await {
            Ok(principal) => principal,
            Err(err) => {
                tracing::warn!(connection_id = %id, path = %metadata.path, error = %err, "Authentication failed");
                if self.config.send_authentication_message {
                    let status = Envelope::authentication(err.status_code(), &err.to_string());
                    let _ = outbox.send(Outbound::Frame(status)).await;
                }
                lifecycle = advance(lifecycle, ConnectionState::Closing);
                let _ = outbox
                    .send(Outbound::Close {
                        code: CLOSE_AUTHENTICATION_FAILED,
                        reason: "Authentication failed".to_string(),
                    })
                    .await;
                drop(outbox);
                let close_code = join_writer(writer).await;
                advance(lifecycle, ConnectionState::Closed);
                return ConnectionOutcome {
                    connection_id: id,
                    close_code,
                    cycles: 0,
                };
            }
        };

        if self.config.send_authentication_message {
            let _ = outbox
                .send(Outbound::Frame(Envelope::authentication(200, "OK")))
                .await;
            let _ = outbox.send(Outbound::Flush).await;
        }
        lifecycle = advance(lifecycle, ConnectionState::Open);
        tracing::info!(connection_id = %id, principal = %principal.label(), path = %metadata.path, "Connection opened");

        let (layer, inbox) = match self.open_inbox(id).await {
            Ok(opened) => opened,
            Err(err) => {
                tracing::error!(connection_id = %id, error = %err, "Channel layer unavailable");
                let _ = outbox.send(Outbound::Frame(internal_error())).await;
                let _ = outbox
                    .send(Outbound::Close {
                        code: CLOSE_INTERNAL_ERROR,
                        reason: "Internal error".to_string(),
                    })
                    .await;
                lifecycle = advance(lifecycle, ConnectionState::Closing);
                drop(outbox);
                let close_code = join_writer(writer).await;
                advance(lifecycle, ConnectionState::Closed);
                return ConnectionOutcome {
                    connection_id: id,
                    close_code,
                    cycles: 0,
                };
            }
        };

        let groups = self.join_groups(id, &principal, &metadata).await;

        let (frame_tx, frame_rx) = mpsc::channel(self.config.inbound_buffer.max(1));
        let (closed_tx, closed_rx) = watch::channel(false);
        let reader = tokio::spawn(read_loop(receiver, frame_tx, closed_tx).in_current_span());

        let mut conn = Connection {
            id,
            principal: Arc::new(principal),
            membership: Arc::new(Membership::new(groups)),
            state: Arc::new(Mutex::new(self.spec.new_state())),
            layer_alias: Arc::from(self.spec.layer_alias()),
            outbox,
            peer_closed: closed_rx,
            cycles: 0,
        };

        self.dispatch_loop(&mut conn, frame_rx, inbox).await;

        lifecycle = advance(lifecycle, ConnectionState::Closing);
        self.teardown(&conn, layer.as_ref()).await;
        reader.abort();
        conn.close(CLOSE_NORMAL, "").await;

        let cycles = conn.cycles;
        drop(conn);
        let close_code = join_writer(writer).await;
        advance(lifecycle, ConnectionState::Closed);

        tracing::info!(
            connection_id = %id,
            cycles,
            close_code = ?close_code,
            duration_ms = started.elapsed().as_millis() as u64,
            "Connection closed"
        );

        ConnectionOutcome {
            connection_id: id,
            close_code,
            cycles,
        }
    }

    async fn open_inbox(
        &self,
        id: ConnectionId,
    ) -> Result<(Arc<dyn ChannelLayer>, Inbox), crate::ports::ChannelLayerError> {
        let layer = self.coordinator.layer(self.spec.layer_alias())?;
        let inbox = layer.register(id).await?;
        Ok((layer, inbox))
    }

    async fn join_groups(
        &self,
        id: ConnectionId,
        principal: &Principal,
        metadata: &ConnectionMetadata,
    ) -> Vec<GroupName> {
        let mut joined = Vec::new();
        for group in self.spec.groups_for(principal, metadata) {
            match self
                .coordinator
                .join_group(self.spec.layer_alias(), &group, id)
                .await
            {
                Ok(()) => joined.push(group),
                Err(e) => {
                    tracing::warn!(connection_id = %id, group = %group, error = %e, "Failed to join group");
                }
            }
        }
        joined
    }

    async fn dispatch_loop(
        &self,
        conn: &mut Connection<S>,
        mut frames: mpsc::Receiver<Frame>,
        mut inbox: Inbox,
    ) {
        let mut inbox_open = true;
        loop {
            let flow = tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => self.on_frame(conn, frame).await,
                    None => {
                        tracing::debug!(connection_id = %conn.id, "Peer closed the connection");
                        Flow::Stop
                    }
                },
                delivery = inbox.recv(), if inbox_open => match delivery {
                    Some(message) => self.on_delivery(conn, message).await,
                    None => {
                        tracing::warn!(connection_id = %conn.id, "Channel layer inbox closed");
                        inbox_open = false;
                        Flow::Continue
                    }
                },
            };
            if let Flow::Stop = flow {
                break;
            }
        }
    }

    async fn on_frame(&self, conn: &mut Connection<S>, frame: Frame) -> Flow {
        let field = self.config.discriminator_field.as_str();
        let decoded = frame
            .as_text()
            .map_err(|e| FrameError::Decode(e.to_string()))
            .and_then(|text| {
                self.spec
                    .registry()
                    .union(Direction::Incoming)
                    .decode_text(text, field)
            });

        match decoded {
            Ok((_, envelope)) => {
                self.config.log_envelope("inbound", &envelope);
                self.invoke(conn, Direction::Incoming, envelope).await
            }
            Err(err) => {
                tracing::debug!(connection_id = %conn.id, kind = err.kind(), error = %err, "Rejected frame");
                conn.send(Envelope::error(err.entries())).await;
                self.finish_cycle(conn, CompletionKind::DirectReply).await;
                Flow::Continue
            }
        }
    }

    async fn on_delivery(&self, conn: &mut Connection<S>, message: ChannelMessage) -> Flow {
        match message {
            ChannelMessage::Broadcast(envelope) => {
                conn.send(envelope).await;
                self.finish_cycle(conn, CompletionKind::GroupBroadcast).await;
                Flow::Continue
            }
            ChannelMessage::Direct(envelope) => {
                conn.send(envelope).await;
                conn.flush().await;
                Flow::Continue
            }
            ChannelMessage::Event(envelope) => {
                let raw = RawEnvelope {
                    payload: (!envelope.payload.is_null()).then_some(envelope.payload),
                    action: envelope.action,
                };
                let decoded = self
                    .spec
                    .registry()
                    .union(Direction::Event)
                    .decode(raw, &self.config.discriminator_field);
                match decoded {
                    Ok((_, envelope)) => {
                        self.config.log_envelope("event", &envelope);
                        self.invoke(conn, Direction::Event, envelope).await
                    }
                    Err(err) => {
                        tracing::warn!(connection_id = %conn.id, kind = err.kind(), error = %err, "Dropped undecodable event");
                        Flow::Continue
                    }
                }
            }
        }
    }

    async fn invoke(&self, conn: &mut Connection<S>, direction: Direction, envelope: Envelope) -> Flow {
        let completion = match direction {
            Direction::Event => CompletionKind::Event,
            _ => CompletionKind::DirectReply,
        };

        let Some(entry) = self.spec.handler(direction, &envelope.action) else {
            let err = FrameError::UnknownAction {
                field: self.config.discriminator_field.clone(),
                action: envelope.action,
            };
            conn.send(Envelope::error(err.entries())).await;
            self.finish_cycle(conn, completion).await;
            return Flow::Continue;
        };

        conn.cycles += 1;
        let cycle = Arc::new(CycleFlags::default());
        let ctx = conn.context(&self.coordinator, Arc::clone(&cycle));
        let call = drive(entry.handler.call(envelope.payload, ctx), conn.outbox.clone());

        let result = tokio::select! {
            result = call => result,
            _ = peer_gone(&mut conn.peer_closed) => {
                tracing::debug!(connection_id = %conn.id, action = %envelope.action, "Peer closed mid-cycle, handler cancelled");
                return Flow::Stop;
            }
        };

        match result {
            Ok(()) => {
                let kind = if completion == CompletionKind::DirectReply && cycle.broadcast_issued() {
                    CompletionKind::GroupBroadcast
                } else {
                    completion
                };
                self.finish_cycle(conn, kind).await;
                Flow::Continue
            }
            Err(HandlerError::Domain(err)) => {
                tracing::debug!(connection_id = %conn.id, action = %envelope.action, code = %err.code, "Handler rejected message");
                conn.send(Envelope::error(vec![domain_entry(err)])).await;
                self.finish_cycle(conn, completion).await;
                Flow::Continue
            }
            Err(HandlerError::Fatal(reason)) => {
                tracing::error!(connection_id = %conn.id, action = %envelope.action, error = %reason, "Handler failed");
                conn.send(internal_error()).await;
                conn.close(CLOSE_INTERNAL_ERROR, "Internal error").await;
                Flow::Stop
            }
        }
    }

    async fn finish_cycle(&self, conn: &Connection<S>, kind: CompletionKind) {
        if self.config.send_completion {
            conn.send(Envelope::completion(kind)).await;
        }
        conn.flush().await;
    }

    /// Leaves every group the connection is in, setup and handler joins
    /// alike, then drops the inbox. A second call finds nothing to leave.
    async fn teardown(&self, conn: &Connection<S>, layer: &dyn ChannelLayer) {
        for group in conn.membership.close().await {
            if let Err(e) = layer.leave_group(&group, conn.id).await {
                tracing::warn!(connection_id = %conn.id, group = %group, error = %e, "Failed to leave group");
            }
        }
        if let Err(e) = layer.unregister(conn.id).await {
            tracing::warn!(connection_id = %conn.id, error = %e, "Failed to unregister inbox");
        }
    }
}

fn advance(current: ConnectionState, target: ConnectionState) -> ConnectionState {
    match current.transition_to(target) {
        Ok(next) => {
            tracing::trace!(from = %current, to = %next, "Connection state changed");
            next
        }
        Err(e) => {
            tracing::error!(error = %e, "Illegal connection state change");
            current
        }
    }
}

fn internal_error() -> Envelope {
    Envelope::error(vec![ErrorEntry::new(
        "internal_error",
        Vec::new(),
        "Internal server error",
    )])
}

fn domain_entry(err: DomainError) -> ErrorEntry {
    let loc = err.loc.into_iter().map(PathSegment::Key).collect();
    ErrorEntry::new(err.code, loc, err.message)
}

/// Awaits the handler and pushes everything it returned to the outbox.
async fn drive(
    handler: BoxFuture<'static, HandlerResult>,
    outbox: mpsc::Sender<Outbound>,
) -> Result<(), HandlerError> {
    match handler.await? {
        Reply::None => {}
        Reply::One(envelope) => {
            let _ = outbox.send(Outbound::Frame(envelope)).await;
        }
        Reply::Stream(mut items) => {
            while let Some(item) = items.next().await {
                let _ = outbox.send(Outbound::Frame(item?)).await;
            }
        }
    }
    Ok(())
}

/// Resolves once the reader task reported the peer gone.
async fn peer_gone(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn read_loop<R: FrameReceiver>(
    mut receiver: R,
    frames: mpsc::Sender<Frame>,
    closed: watch::Sender<bool>,
) {
    while let Some(item) = receiver.receive().await {
        match item {
            Ok(frame) => {
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Receive failed");
                break;
            }
        }
    }
    let _ = closed.send(true);
}

/// Writes outbound frames and returns the close code it sent.
async fn write_loop<W: FrameSender>(
    mut sender: W,
    mut commands: mpsc::Receiver<Outbound>,
    config: Arc<DispatcherConfig>,
) -> Option<u16> {
    let mut pending: Vec<Envelope> = Vec::new();
    let mut healthy = true;

    while let Some(command) = commands.recv().await {
        match command {
            Outbound::Frame(envelope) => match config.flush {
                FlushMode::Immediate => write(&mut sender, &config, &envelope, &mut healthy).await,
                FlushMode::EndOfCycle => pending.push(envelope),
            },
            Outbound::Flush => {
                for envelope in pending.drain(..) {
                    write(&mut sender, &config, &envelope, &mut healthy).await;
                }
            }
            Outbound::Close { code, reason } => {
                for envelope in pending.drain(..) {
                    write(&mut sender, &config, &envelope, &mut healthy).await;
                }
                return match sender.close(code, &reason).await {
                    Ok(()) => Some(code),
                    Err(e) => {
                        tracing::debug!(code, error = %e, "Close frame not sent");
                        None
                    }
                };
            }
        }
    }
    None
}

async fn write<W: FrameSender>(
    sender: &mut W,
    config: &DispatcherConfig,
    envelope: &Envelope,
    healthy: &mut bool,
) {
    if !*healthy {
        return;
    }
    config.log_envelope("outbound", envelope);
    let text = envelope.encode(&config.discriminator_field);
    if let Err(e) = sender.send(Frame::Text(text)).await {
        tracing::debug!(action = %envelope.action, error = %e, "Send failed, dropping further output");
        *healthy = false;
    }
}

async fn join_writer(writer: tokio::task::JoinHandle<Option<u16>>) -> Option<u16> {
    match writer.await {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(error = %e, "Writer task failed");
            None
        }
    }
}
