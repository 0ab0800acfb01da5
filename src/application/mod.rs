//! Application layer - Consumers, dispatch, and broadcast coordination.
//!
//! This layer turns consumer declarations into running connections and
//! coordinates between ports:
//!
//! - `builder` - Registration of kinds and handlers into a `ConsumerSpec`
//! - `dispatcher` - Per-connection state machine
//! - `coordinator` - Group membership and fan-out across channel layers
//! - `schema_generator` - Protocol document from consumer declarations

pub mod builder;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod handler;
pub mod schema_generator;

pub use builder::{ChannelDescriptor, ChannelMetadata, ConsumerBuilder, ConsumerSpec, GroupResolver};
pub use context::HandlerContext;
pub use coordinator::{BroadcastCoordinator, BroadcastTarget, ChannelLayers, DEFAULT_LAYER_ALIAS};
pub use dispatcher::{ConnectionDispatcher, ConnectionOutcome, DispatcherConfig, FlushMode};
pub use handler::{
    BoxFuture, DocMeta, Handler, HandlerEntry, HandlerError, HandlerInfo, HandlerResult,
    OutputRef, Outputs, Reply, TypedHandler,
};
pub use schema_generator::{
    AsyncApiDocument, DocsInfo, GenerationError, OperationAction, SchemaGenerator,
};
