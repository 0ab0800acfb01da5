//! Protocol document generation.
//!
//! Walks consumer declarations and produces an AsyncAPI 3.0 shaped
//! [`AsyncApiDocument`]. Generation is pure: the same consumers always give
//! the same document, and no connection needs to exist.
//!
//! ```text
//! channels.chat.messages.Ping      ─► components.messages.Ping
//! operations.chat_receive_ping     ─► channels.chat.messages.Ping
//! operations.chat_send_ping        ─► channels.chat.messages.Pong
//! components.schemas.*             ─► hoisted payload definitions
//! ```

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::protocol::{
    Definitions, Direction, MessageKind, SchemaError, DEFAULT_DISCRIMINATOR_FIELD, PAYLOAD_FIELD,
};

use super::builder::ChannelDescriptor;
use super::handler::{HandlerInfo, OutputRef};

pub const ASYNCAPI_VERSION: &str = "3.0.0";

/// Errors raised while generating a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Channel '{0}' is declared by more than one consumer")]
    DuplicateChannel(String),

    #[error("Message name '{0}' is used by different kinds")]
    ConflictingMessageName(String),

    #[error("Failed to serialize document: {0}")]
    Serialization(String),
}

/// Top-level document information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// Public WebSocket base URL, e.g. `ws://localhost:8000`.
    pub server_url: Option<String>,
}

impl Default for DocsInfo {
    fn default() -> Self {
        Self {
            title: "Switchboard API".to_string(),
            version: "0.1.0".to_string(),
            description: None,
            server_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncApiDocument {
    pub asyncapi: String,
    pub info: Info,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub servers: BTreeMap<String, Server>,
    pub channels: BTreeMap<String, Channel>,
    pub operations: BTreeMap<String, Operation>,
    pub components: Components,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Server {
    pub host: String,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    #[serde(rename = "$ref")]
    pub reference: String,
}

impl Reference {
    fn to(path: String) -> Self {
        Self { reference: path }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: BTreeMap<String, Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    /// The server receives these messages.
    Receive,
    /// The server sends these messages.
    Send,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub action: OperationAction,
    pub channel: Reference,
    pub messages: Vec<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageObject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Full envelope schema: discriminator constant plus payload.
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Components {
    pub schemas: BTreeMap<String, Value>,
    pub messages: BTreeMap<String, MessageObject>,
}

impl AsyncApiDocument {
    pub fn to_json(&self) -> Result<Value, GenerationError> {
        serde_json::to_value(self).map_err(|e| GenerationError::Serialization(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String, GenerationError> {
        serde_json::to_string_pretty(self).map_err(|e| GenerationError::Serialization(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, GenerationError> {
        serde_yaml::to_string(self).map_err(|e| GenerationError::Serialization(e.to_string()))
    }
}

/// Builds protocol documents from consumer declarations.
#[derive(Debug, Clone)]
pub struct SchemaGenerator {
    info: DocsInfo,
    discriminator_field: String,
}

impl SchemaGenerator {
    pub fn new(info: DocsInfo) -> Self {
        Self {
            info,
            discriminator_field: DEFAULT_DISCRIMINATOR_FIELD.to_string(),
        }
    }

    /// Envelope key documented as the discriminator.
    pub fn discriminator_field(mut self, field: impl Into<String>) -> Self {
        self.discriminator_field = field.into();
        self
    }

    pub fn generate(
        &self,
        consumers: &[&dyn ChannelDescriptor],
    ) -> Result<AsyncApiDocument, GenerationError> {
        let mut definitions = Definitions::new();
        let mut messages = MessageTable::default();
        let mut channels = BTreeMap::new();
        let mut operations = BTreeMap::new();

        for consumer in consumers {
            definitions.merge(consumer.registry().definitions())?;

            let key = channel_key(*consumer);
            if channels.contains_key(&key) {
                return Err(GenerationError::DuplicateChannel(key));
            }

            let mut channel_messages = BTreeMap::new();
            let mut names: HashMap<(Direction, String), String> = HashMap::new();
            for direction in [Direction::Incoming, Direction::OutgoingHint] {
                for kind in consumer.registry().kinds(direction) {
                    let name = messages.insert(kind, &self.discriminator_field, consumer.registry().definitions())?;
                    channel_messages.insert(
                        name.clone(),
                        Reference::to(format!("#/components/messages/{}", name)),
                    );
                    names.insert((direction, kind.action.clone()), name);
                }
            }

            let metadata = consumer.metadata();
            channels.insert(
                key.clone(),
                Channel {
                    address: consumer.address().map(str::to_string),
                    title: metadata.map(|m| m.name.clone()),
                    description: metadata.and_then(|m| m.description.clone()),
                    messages: channel_messages,
                    tags: metadata.map(|m| tags(&m.tags)).unwrap_or_default(),
                },
            );

            for info in consumer.handler_infos() {
                self.add_operations(&key, info, &names, &mut operations);
            }
        }

        let components = Components {
            schemas: definitions
                .iter()
                .map(|(name, schema)| (name.clone(), schema.to_json()))
                .collect(),
            messages: messages.objects,
        };

        Ok(AsyncApiDocument {
            asyncapi: ASYNCAPI_VERSION.to_string(),
            info: Info {
                title: self.info.title.clone(),
                version: self.info.version.clone(),
                description: self.info.description.clone(),
            },
            servers: self.servers(),
            channels,
            operations,
            components,
        })
    }

    fn add_operations(
        &self,
        channel: &str,
        info: &HandlerInfo,
        names: &HashMap<(Direction, String), String>,
        operations: &mut BTreeMap<String, Operation>,
    ) {
        let channel_ref = Reference::to(format!("#/channels/{}", channel));
        let message_ref = |name: &str| {
            Reference::to(format!("#/channels/{}/messages/{}", channel, name))
        };

        if info.direction == Direction::Incoming {
            if let Some(name) = names.get(&(Direction::Incoming, info.action.clone())) {
                operations.insert(
                    format!("{}_receive_{}", channel, info.action),
                    Operation {
                        action: OperationAction::Receive,
                        channel: channel_ref.clone(),
                        messages: vec![message_ref(name)],
                        summary: info.doc.summary.clone(),
                        description: info.doc.description.clone(),
                        tags: tags(&info.doc.tags),
                    },
                );
            }
        }

        if info.outputs.is_empty() {
            return;
        }
        let outputs: Vec<Reference> = info
            .outputs
            .kinds()
            .iter()
            .filter_map(|output: &OutputRef| names.get(&(Direction::OutgoingHint, output.action.to_string())))
            .map(|name| message_ref(name))
            .collect();
        let verb = match info.direction {
            Direction::Event => "event",
            _ => "send",
        };
        operations.insert(
            format!("{}_{}_{}", channel, verb, info.action),
            Operation {
                action: OperationAction::Send,
                channel: channel_ref,
                messages: outputs,
                summary: info.doc.summary.clone(),
                description: info.doc.description.clone(),
                tags: tags(&info.doc.tags),
            },
        );
    }

    fn servers(&self) -> BTreeMap<String, Server> {
        let Some(url) = &self.info.server_url else {
            return BTreeMap::new();
        };
        let (protocol, host) = url.split_once("://").unwrap_or(("ws", url.as_str()));
        BTreeMap::from([(
            "default".to_string(),
            Server {
                host: host.trim_end_matches('/').to_string(),
                protocol: protocol.to_string(),
            },
        )])
    }
}

/// Message components shared by every channel of a document.
#[derive(Default)]
struct MessageTable {
    objects: BTreeMap<String, MessageObject>,
    owners: HashMap<String, TypeId>,
}

impl MessageTable {
    /// Adds `kind` and returns its component name. A name already taken by
    /// another type is retried with the direction appended.
    fn insert(
        &mut self,
        kind: &MessageKind,
        field: &str,
        defs: &Definitions,
    ) -> Result<String, GenerationError> {
        let suffix = match kind.direction {
            Direction::Incoming => "Incoming",
            Direction::OutgoingHint => "Outgoing",
            Direction::Event => "Event",
        };
        for name in [kind.name.clone(), format!("{}{}", kind.name, suffix)] {
            match self.owners.get(&name) {
                Some(owner) if *owner == kind.type_id => return Ok(name),
                Some(_) => continue,
                None => {
                    self.owners.insert(name.clone(), kind.type_id);
                    self.objects.insert(
                        name.clone(),
                        MessageObject {
                            name: name.clone(),
                            summary: kind.summary.clone(),
                            payload: envelope_schema(kind, field, defs),
                        },
                    );
                    return Ok(name);
                }
            }
        }
        Err(GenerationError::ConflictingMessageName(kind.name.clone()))
    }
}

fn envelope_schema(kind: &MessageKind, field: &str, defs: &Definitions) -> Value {
    let mut required = vec![field.to_string()];
    if !kind.payload.accepts_absent(defs) {
        required.push(PAYLOAD_FIELD.to_string());
    }
    json!({
        "type": "object",
        "properties": {
            field: { "type": "string", "const": kind.action },
            PAYLOAD_FIELD: kind.payload.to_json(),
        },
        "required": required,
    })
}

fn channel_key(consumer: &dyn ChannelDescriptor) -> String {
    let source = consumer
        .metadata()
        .map(|m| m.name.as_str())
        .unwrap_or_else(|| consumer.identity());
    let mut key = String::with_capacity(source.len());
    for c in source.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

fn tags(names: &[String]) -> Vec<Tag> {
    names.iter().map(|name| Tag { name: name.clone() }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::builder::{ChannelMetadata, ConsumerBuilder};
    use crate::application::context::HandlerContext;
    use crate::application::handler::{DocMeta, Outputs, Reply};
    use crate::domain::protocol::{Message, MessageSchema, ObjectSchema, Schema};
    use serde::{Deserialize, Serialize};
    use std::borrow::Cow;

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping;

    impl MessageSchema for Ping {
        fn json_schema(_defs: &mut Definitions) -> Schema {
            Schema::null()
        }
    }

    impl Message for Ping {
        const ACTION: &'static str = "ping";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Pong {
        at: String,
    }

    impl MessageSchema for Pong {
        fn schema_name() -> Option<Cow<'static, str>> {
            Some("PongPayload".into())
        }

        fn json_schema(_defs: &mut Definitions) -> Schema {
            ObjectSchema::new().required("at", Schema::string()).build()
        }
    }

    impl Message for Pong {
        const ACTION: &'static str = "pong";

        fn summary() -> Option<&'static str> {
            Some("Liveness reply")
        }
    }

    fn consumer(name: Option<&str>) -> crate::application::builder::ConsumerSpec<()> {
        let mut builder = ConsumerBuilder::<()>::new("ping-consumer");
        builder.address("/ws/ping");
        if let Some(name) = name {
            builder
                .channel_metadata(ChannelMetadata::new(name).description("Liveness").tag("system"))
                .unwrap();
        }
        builder
            .register_outgoing::<Pong>()
            .unwrap()
            .register_handler(
                |_: Ping, _ctx: HandlerContext<()>| async {
                    Reply::message(&Pong { at: "now".into() })
                },
                Outputs::single::<Pong>(),
                DocMeta::new().summary("Ping the server"),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn document_has_channel_operations_and_components() {
        let spec = consumer(Some("Ping"));
        let doc = SchemaGenerator::new(DocsInfo::default())
            .generate(&[&spec])
            .unwrap();

        assert_eq!(doc.asyncapi, "3.0.0");
        let channel = &doc.channels["ping"];
        assert_eq!(channel.address.as_deref(), Some("/ws/ping"));
        assert_eq!(channel.messages.len(), 2);

        let receive = &doc.operations["ping_receive_ping"];
        assert_eq!(receive.action, OperationAction::Receive);
        assert_eq!(receive.messages[0].reference, "#/channels/ping/messages/Ping");
        assert_eq!(receive.summary.as_deref(), Some("Ping the server"));

        let send = &doc.operations["ping_send_ping"];
        assert_eq!(send.messages[0].reference, "#/channels/ping/messages/PongPayload");

        assert!(doc.components.schemas.contains_key("PongPayload"));
        assert_eq!(
            doc.components.messages["PongPayload"].payload["properties"]["payload"],
            json!({"$ref": "#/components/schemas/PongPayload"})
        );
        assert_eq!(
            doc.components.messages["Ping"].payload["required"],
            json!(["action"])
        );
    }

    #[test]
    fn channel_falls_back_to_identity() {
        let spec = consumer(None);
        let doc = SchemaGenerator::new(DocsInfo::default())
            .generate(&[&spec])
            .unwrap();
        assert!(doc.channels.contains_key("ping_consumer"));
        assert!(doc.operations.contains_key("ping_consumer_receive_ping"));
    }

    #[test]
    fn duplicate_channels_are_rejected() {
        let first = consumer(Some("Ping"));
        let second = consumer(Some("Ping"));
        let err = SchemaGenerator::new(DocsInfo::default())
            .generate(&[&first, &second])
            .unwrap_err();
        assert_eq!(err, GenerationError::DuplicateChannel("ping".to_string()));
    }

    #[test]
    fn custom_discriminator_is_documented() {
        let spec = consumer(Some("Ping"));
        let doc = SchemaGenerator::new(DocsInfo::default())
            .discriminator_field("type")
            .generate(&[&spec])
            .unwrap();
        let payload = &doc.components.messages["Ping"].payload;
        assert_eq!(payload["properties"]["type"]["const"], "ping");
    }

    #[test]
    fn servers_come_from_url() {
        let info = DocsInfo {
            server_url: Some("wss://chat.example.com/".to_string()),
            ..DocsInfo::default()
        };
        let doc = SchemaGenerator::new(info).generate(&[]).unwrap();
        let server = &doc.servers["default"];
        assert_eq!(server.protocol, "wss");
        assert_eq!(server.host, "chat.example.com");
    }

    #[test]
    fn yaml_and_json_agree() {
        let spec = consumer(Some("Ping"));
        let doc = SchemaGenerator::new(DocsInfo::default())
            .generate(&[&spec])
            .unwrap();
        let from_yaml: Value = serde_yaml::from_str(&doc.to_yaml().unwrap()).unwrap();
        assert_eq!(from_yaml, doc.to_json().unwrap());
    }
}
