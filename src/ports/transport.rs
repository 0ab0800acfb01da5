//! Transport port - The socket a dispatcher reads frames from and writes to.
//!
//! The dispatcher owns a split connection: a [`FrameReceiver`] consumed by a
//! reader task and a [`FrameSender`] owned by a writer task. Adapters wrap a
//! concrete socket (axum WebSocket, an in-memory pipe for tests).

use std::collections::BTreeMap;
use std::net::SocketAddr;

use async_trait::async_trait;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// The server hit an unexpected condition.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Authentication failed before the connection opened.
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4003;

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Frame contents as UTF-8 text.
    pub fn as_text(&self) -> Result<&str, std::str::Utf8Error> {
        match self {
            Frame::Text(text) => Ok(text),
            Frame::Binary(bytes) => std::str::from_utf8(bytes),
        }
    }
}

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer is gone.
    #[error("Transport closed")]
    Closed,

    /// Underlying socket failure.
    #[error("Transport I/O error: {0}")]
    Io(String),
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameReceiver: Send {
    /// Next frame, or `None` once the peer closed the connection.
    async fn receive(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSender: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Sends a close frame. Later sends are expected to fail.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// What is known about a connection before it is accepted.
///
/// Header names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub peer: Option<SocketAddr>,
}

impl ConnectionMetadata {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Token from `Authorization: Bearer ...`, else the `token` query parameter.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .or_else(|| self.query_param("token"))
    }
}
