//! Consumer registration.
//!
//! A [`ConsumerBuilder`] collects message kinds, handlers and channel
//! metadata for one consumer at start-up and produces an immutable
//! [`ConsumerSpec`]. Every declaration error is reported immediately so a
//! bad consumer never serves traffic.
//!
//! # Example
//!
//! ```ignore
//! let mut builder = ConsumerBuilder::<ChatState>::new("chat");
//! builder
//!     .channel_metadata(ChannelMetadata::new("Chat").description("Group chat"))?
//!     .register_outgoing::<Pong>()?
//!     .register_handler(
//!         |_: Ping, _ctx| async { Reply::message(&Pong) },
//!         Outputs::single::<Pong>(),
//!         DocMeta::new(),
//!     )?;
//! let spec = Arc::new(builder.build());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::domain::foundation::{GroupName, Principal};
use crate::domain::protocol::{
    Direction, DiscriminatorNamespaces, Message, MessageRegistry, RegistrationError,
};
use crate::ports::ConnectionMetadata;

use super::context::HandlerContext;
use super::coordinator::DEFAULT_LAYER_ALIAS;
use super::handler::{DocMeta, HandlerEntry, HandlerInfo, HandlerResult, Outputs, TypedHandler};

/// Documentation identity of a consumer's channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMetadata {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl ChannelMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
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

/// Computes the groups a connection joins when it opens.
pub type GroupResolver = Arc<dyn Fn(&Principal, &ConnectionMetadata) -> Vec<GroupName> + Send + Sync>;

type StateFactory<S> = Arc<dyn Fn() -> S + Send + Sync>;

/// Read-only view of a consumer used by the schema generator.
pub trait ChannelDescriptor {
    /// Stable identity, used when no channel metadata is set.
    fn identity(&self) -> &str;

    /// Route the consumer is served on.
    fn address(&self) -> Option<&str>;

    fn metadata(&self) -> Option<&ChannelMetadata>;

    fn registry(&self) -> &MessageRegistry;

    /// Handlers, incoming first, each direction in action order.
    fn handler_infos(&self) -> Vec<&HandlerInfo>;
}

/// Collects the declarations of one consumer.
pub struct ConsumerBuilder<S> {
    identity: String,
    address: Option<String>,
    metadata: Option<ChannelMetadata>,
    registry: MessageRegistry,
    handlers: BTreeMap<(Direction, String), HandlerEntry<S>>,
    static_groups: Vec<GroupName>,
    group_resolver: Option<GroupResolver>,
    layer_alias: String,
    state_factory: StateFactory<S>,
}

impl<S: Default + Send + 'static> ConsumerBuilder<S> {
    /// Starts a consumer whose per-connection state is `S::default()`.
    pub fn new(identity: impl Into<String>) -> Self {
        Self::with_state(identity, S::default)
    }
}

impl<S: Send + 'static> ConsumerBuilder<S> {
    /// Starts a consumer whose per-connection state comes from `factory`.
    pub fn with_state<F>(identity: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            identity: identity.into(),
            address: None,
            metadata: None,
            registry: MessageRegistry::default(),
            handlers: BTreeMap::new(),
            static_groups: Vec::new(),
            group_resolver: None,
            layer_alias: DEFAULT_LAYER_ALIAS.to_string(),
            state_factory: Arc::new(factory),
        }
    }

    /// Sets the discriminator namespace policy. Must be called before any
    /// kind is registered; later calls are ignored with a warning.
    pub fn namespaces(&mut self, namespaces: DiscriminatorNamespaces) -> &mut Self {
        let untouched = [Direction::Incoming, Direction::OutgoingHint, Direction::Event]
            .into_iter()
            .all(|direction| self.registry.kinds(direction).next().is_none());
        if untouched {
            self.registry = MessageRegistry::new(namespaces);
        } else {
            tracing::warn!(consumer = %self.identity, "Namespace policy set after registration, ignored");
        }
        self
    }

    pub fn address(&mut self, address: impl Into<String>) -> &mut Self {
        self.address = Some(address.into());
        self
    }

    /// Routes this consumer's group traffic through the backend at `alias`.
    pub fn layer_alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.layer_alias = alias.into();
        self
    }

    /// Groups every connection joins.
    pub fn groups<I: IntoIterator<Item = GroupName>>(&mut self, groups: I) -> &mut Self {
        self.static_groups.extend(groups);
        self
    }

    /// Groups computed per connection, joined in addition to the static ones.
    pub fn group_resolver<F>(&mut self, resolver: F) -> &mut Self
    where
        F: Fn(&Principal, &ConnectionMetadata) -> Vec<GroupName> + Send + Sync + 'static,
    {
        self.group_resolver = Some(Arc::new(resolver));
        self
    }

    /// Sets the channel metadata. Fails on the second call.
    pub fn channel_metadata(
        &mut self,
        metadata: ChannelMetadata,
    ) -> Result<&mut Self, RegistrationError> {
        if self.metadata.is_some() {
            return Err(RegistrationError::DuplicateChannelMetadata {
                consumer: self.identity.clone(),
            });
        }
        self.metadata = Some(metadata);
        Ok(self)
    }

    /// Declares a kind the server sends. Declared handler outputs must be
    /// registered here first.
    pub fn register_outgoing<M: Message>(&mut self) -> Result<&mut Self, RegistrationError> {
        self.registry.register::<M>(Direction::OutgoingHint)?;
        Ok(self)
    }

    /// Binds a handler to the client-sent kind `M`.
    pub fn register_handler<M, F, Fut>(
        &mut self,
        handler: F,
        outputs: Outputs,
        doc: DocMeta,
    ) -> Result<&mut Self, RegistrationError>
    where
        M: Message,
        F: Fn(M, HandlerContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind::<M, F, Fut>(Direction::Incoming, handler, outputs, doc)
    }

    /// Binds a handler to the event kind `M`, delivered through the channel layer.
    pub fn register_event_handler<M, F, Fut>(
        &mut self,
        handler: F,
        outputs: Outputs,
        doc: DocMeta,
    ) -> Result<&mut Self, RegistrationError>
    where
        M: Message,
        F: Fn(M, HandlerContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind::<M, F, Fut>(Direction::Event, handler, outputs, doc)
    }

    fn bind<M, F, Fut>(
        &mut self,
        direction: Direction,
        handler: F,
        outputs: Outputs,
        mut doc: DocMeta,
    ) -> Result<&mut Self, RegistrationError>
    where
        M: Message,
        F: Fn(M, HandlerContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if let Some(undeclared) = outputs
            .kinds()
            .iter()
            .find(|kind| !self.registry.contains_type(Direction::OutgoingHint, kind.type_id))
        {
            return Err(RegistrationError::InvalidOutputKind {
                type_name: undeclared.type_name,
            });
        }

        self.registry.register::<M>(direction)?;

        if doc.summary.is_none() {
            doc.summary = M::summary().map(str::to_string);
        }
        let entry = HandlerEntry {
            info: HandlerInfo {
                direction,
                action: M::ACTION.to_string(),
                outputs,
                doc,
            },
            handler: Arc::new(TypedHandler::new(handler)),
        };
        self.handlers.insert((direction, M::ACTION.to_string()), entry);
        tracing::trace!(consumer = %self.identity, action = M::ACTION, %direction, "Handler registered");
        Ok(self)
    }

    /// Freezes the declarations.
    pub fn build(self) -> ConsumerSpec<S> {
        ConsumerSpec {
            identity: self.identity,
            address: self.address,
            metadata: self.metadata,
            registry: self.registry,
            handlers: self.handlers,
            static_groups: self.static_groups,
            group_resolver: self.group_resolver,
            layer_alias: self.layer_alias,
            state_factory: self.state_factory,
        }
    }
}

/// Immutable declarations of one consumer, shared by all its connections.
pub struct ConsumerSpec<S> {
    identity: String,
    address: Option<String>,
    metadata: Option<ChannelMetadata>,
    registry: MessageRegistry,
    handlers: BTreeMap<(Direction, String), HandlerEntry<S>>,
    static_groups: Vec<GroupName>,
    group_resolver: Option<GroupResolver>,
    layer_alias: String,
    state_factory: StateFactory<S>,
}

impl<S> ConsumerSpec<S> {
    pub fn handler(&self, direction: Direction, action: &str) -> Option<&HandlerEntry<S>> {
        self.handlers.get(&(direction, action.to_string()))
    }

    pub fn handlers(&self) -> impl Iterator<Item = &HandlerEntry<S>> {
        self.handlers.values()
    }

    pub fn layer_alias(&self) -> &str {
        &self.layer_alias
    }

    /// Fresh per-connection state.
    pub fn new_state(&self) -> S {
        (self.state_factory)()
    }

    /// Static groups followed by resolved ones, without duplicates.
    pub fn groups_for(&self, principal: &Principal, metadata: &ConnectionMetadata) -> Vec<GroupName> {
        let mut groups = self.static_groups.clone();
        if let Some(resolver) = &self.group_resolver {
            groups.extend(resolver(principal, metadata));
        }
        let mut seen = std::collections::BTreeSet::new();
        groups.retain(|group| seen.insert(group.clone()));
        groups
    }
}

impl<S> ChannelDescriptor for ConsumerSpec<S> {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    fn metadata(&self) -> Option<&ChannelMetadata> {
        self.metadata.as_ref()
    }

    fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    fn handler_infos(&self) -> Vec<&HandlerInfo> {
        self.handlers.values().map(|entry| &entry.info).collect()
    }
}

impl<S> fmt::Debug for ConsumerSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerSpec")
            .field("identity", &self.identity)
            .field("address", &self.address)
            .field("handlers", &self.handlers.len())
            .field("layer_alias", &self.layer_alias)
            .finish()
    }
}

impl<S> fmt::Debug for ConsumerBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerBuilder")
            .field("identity", &self.identity)
            .field("address", &self.address)
            .field("handlers", &self.handlers.len())
            .field("layer_alias", &self.layer_alias)
            .finish()
    }
}
