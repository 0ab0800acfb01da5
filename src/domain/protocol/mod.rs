//! Protocol module - Wire envelopes, message kinds and payload schemas.

mod envelope;
mod message;
mod registry;
mod schema;
mod validation;

pub use envelope::{
    is_reserved_action, CompletionKind, Envelope, FrameError, RawEnvelope, AUTHENTICATION_ACTION,
    DEFAULT_DISCRIMINATOR_FIELD, ERROR_ACTION, PAYLOAD_FIELD, RESERVED_ACTIONS,
};
pub use message::{Direction, Message, MessageKind};
pub use registry::{DiscriminatorNamespaces, MessageRegistry, MessageUnion, RegistrationError};
pub use schema::{
    Definitions, MessageSchema, ObjectSchema, Property, Schema, SchemaError, SchemaKind,
    COMPONENTS_REF_PREFIX,
};
pub use validation::{validate, ErrorEntry, PathSegment};

pub(crate) use message::pascal_case;
