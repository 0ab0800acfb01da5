//! Handler table entries.
//!
//! A handler is an async function `(M, HandlerContext<S>) -> Result<Reply, HandlerError>`
//! bound to the discriminator of `M`. [`TypedHandler`] erases the payload
//! type so handlers of different kinds live in one table.
//!
//! # Example
//!
//! ```ignore
//! builder.register_handler(
//!     |_: Ping, _ctx| async { Reply::message(&Pong) },
//!     Outputs::single::<Pong>(),
//!     DocMeta::new().summary("Liveness check"),
//! )?;
//! ```

use std::any::TypeId;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::DomainError;
use crate::domain::protocol::{Direction, Envelope, Message, PAYLOAD_FIELD};
use crate::ports::ChannelLayerError;

use super::context::HandlerContext;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type of handler functions.
pub type HandlerResult = Result<Reply, HandlerError>;

/// Failure of a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business-rule failure. Reported to the client; the connection stays open.
    #[error("{0}")]
    Domain(DomainError),

    /// Anything else. The connection is closed after a best-effort error frame.
    #[error("Handler failed: {0}")]
    Fatal(String),
}

impl HandlerError {
    pub fn domain(code: impl Into<String>, message: impl Into<String>) -> Self {
        HandlerError::Domain(DomainError::new(code, message))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        HandlerError::Fatal(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::Fatal(_))
    }
}

impl From<DomainError> for HandlerError {
    fn from(err: DomainError) -> Self {
        HandlerError::Domain(err)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Fatal(format!("Serialization failed: {}", err))
    }
}

impl From<ChannelLayerError> for HandlerError {
    fn from(err: ChannelLayerError) -> Self {
        HandlerError::Fatal(err.to_string())
    }
}

/// What a handler hands back to the dispatcher.
pub enum Reply {
    /// Nothing beyond what the handler already sent.
    None,
    /// One message to the originating connection.
    One(Envelope),
    /// A finite sequence drained in order. Not restartable.
    Stream(BoxStream<'static, Result<Envelope, HandlerError>>),
}

impl Reply {
    /// Reply with a single typed message.
    pub fn message<M: Message>(message: &M) -> HandlerResult {
        Ok(Reply::One(Envelope::from_message(message)?))
    }

    /// Reply with a lazily produced sequence of typed messages.
    pub fn stream<St, M>(stream: St) -> HandlerResult
    where
        St: Stream<Item = Result<M, HandlerError>> + Send + 'static,
        M: Message,
    {
        let envelopes = stream.map(|item| item.and_then(|m| Ok(Envelope::from_message(&m)?)));
        Ok(Reply::Stream(envelopes.boxed()))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::None => write!(f, "Reply::None"),
            Reply::One(envelope) => f.debug_tuple("Reply::One").field(envelope).finish(),
            Reply::Stream(_) => write!(f, "Reply::Stream(..)"),
        }
    }
}

/// Type-erased handler.
pub trait Handler<S>: Send + Sync + 'static {
    /// Handles an already validated payload.
    fn call(&self, payload: Value, ctx: HandlerContext<S>) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that deserializes the payload before calling the handler.
pub struct TypedHandler<F, M, Fut> {
    handler: F,
    _phantom: PhantomData<fn(M) -> Fut>,
}

impl<F, M, Fut> TypedHandler<F, M, Fut> {
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<S, F, M, Fut> Handler<S> for TypedHandler<F, M, Fut>
where
    S: Send + 'static,
    F: Fn(M, HandlerContext<S>) -> Fut + Send + Sync + 'static,
    M: Message,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, payload: Value, ctx: HandlerContext<S>) -> BoxFuture<'static, HandlerResult> {
        // The payload already passed schema validation; a failure here means
        // the schema is looser than the type.
        let parsed: M = match serde_json::from_value(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                let err = DomainError::new("value_error", e.to_string()).at([PAYLOAD_FIELD]);
                return Box::pin(async move { Err(HandlerError::Domain(err)) });
            }
        };
        Box::pin((self.handler)(parsed, ctx))
    }
}

/// Reference to a registered outgoing kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRef {
    pub action: &'static str,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl OutputRef {
    pub fn of<M: Message>() -> Self {
        Self {
            action: M::ACTION,
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
        }
    }
}

/// Declared output of a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Outputs {
    #[default]
    None,
    Single(OutputRef),
    /// One of several kinds.
    Union(Vec<OutputRef>),
    /// A lazy sequence of these kinds.
    Stream(Vec<OutputRef>),
}

impl Outputs {
    pub fn single<M: Message>() -> Self {
        Outputs::Single(OutputRef::of::<M>())
    }

    pub fn union(kinds: Vec<OutputRef>) -> Self {
        Outputs::Union(kinds)
    }

    pub fn stream<M: Message>() -> Self {
        Outputs::Stream(vec![OutputRef::of::<M>()])
    }

    /// Every referenced kind.
    pub fn kinds(&self) -> &[OutputRef] {
        match self {
            Outputs::None => &[],
            Outputs::Single(kind) => std::slice::from_ref(kind),
            Outputs::Union(kinds) | Outputs::Stream(kinds) => kinds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

/// Documentation attached to a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocMeta {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl DocMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Registration facts about one handler, independent of the state type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    pub direction: Direction,
    /// Discriminator of the accepted kind.
    pub action: String,
    pub outputs: Outputs,
    pub doc: DocMeta,
}

/// One row of a consumer's handler table.
pub struct HandlerEntry<S> {
    pub info: HandlerInfo,
    pub handler: Arc<dyn Handler<S>>,
}

impl<S> Clone for HandlerEntry<S> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S> fmt::Debug for HandlerEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry").field("info", &self.info).finish()
    }
}
