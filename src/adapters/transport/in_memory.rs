//! In-memory transport pair for tests and embedding.
//!
//! [`memory_transport`] returns the two server-side halves a dispatcher
//! drives plus a [`MemoryClient`] playing the remote peer.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::ports::{Frame, FrameReceiver, FrameSender, TransportError};

/// Something the server did to the connection, as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Frame),
    Close { code: u16, reason: String },
}

/// Server-side inbound half.
pub struct MemoryFrameReceiver {
    rx: mpsc::UnboundedReceiver<Frame>,
}

/// Server-side outbound half.
pub struct MemoryFrameSender {
    tx: mpsc::UnboundedSender<TransportEvent>,
    closed: bool,
}

/// Remote end of an in-memory connection.
pub struct MemoryClient {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Creates a connected transport.
pub fn memory_transport() -> (MemoryFrameReceiver, MemoryFrameSender, MemoryClient) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        MemoryFrameReceiver { rx: server_rx },
        MemoryFrameSender {
            tx: server_tx,
            closed: false,
        },
        MemoryClient {
            tx: Some(client_tx),
            rx: client_rx,
        },
    )
}

#[async_trait]
impl FrameReceiver for MemoryFrameReceiver {
    async fn receive(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

#[async_trait]
impl FrameSender for MemoryFrameSender {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(TransportEvent::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tx
            .send(TransportEvent::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| TransportError::Closed)
    }
}

impl MemoryClient {
    /// Sends a text frame. Returns false once the connection is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(Frame::Text(text.into())).is_ok())
    }

    pub fn send_json(&self, value: &Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Simulates the peer going away.
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// Next server event, `None` once the server dropped its sender.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Next frame decoded as JSON; `None` on close or end of stream.
    pub async fn recv_json(&mut self) -> Option<Value> {
        match self.recv().await? {
            TransportEvent::Frame(frame) => {
                let text = frame.as_text().ok()?;
                serde_json::from_str(text).ok()
            }
            TransportEvent::Close { .. } => None,
        }
    }

    /// Frames until and including the first one whose `field` equals one of
    /// `stop_actions`.
    pub async fn recv_until(&mut self, field: &str, stop_actions: &[&str]) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Some(frame) = self.recv_json().await {
            let stop = frame
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|action| stop_actions.contains(&action));
            frames.push(frame);
            if stop {
                break;
            }
        }
        frames
    }

    /// Event already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}
