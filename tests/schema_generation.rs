//! Integration tests for protocol document generation.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use switchboard::application::{
    ChannelDescriptor, ChannelMetadata, ConsumerBuilder, ConsumerSpec, DocMeta, DocsInfo,
    GenerationError, HandlerContext, Outputs, Reply, SchemaGenerator,
};
use switchboard::chat::chat_consumer;
use switchboard::domain::protocol::{
    Definitions, Direction, DiscriminatorNamespaces, Message, MessageSchema, ObjectSchema, Schema,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Author {
    name: String,
}

impl MessageSchema for Author {
    fn schema_name() -> Option<Cow<'static, str>> {
        Some("Author".into())
    }

    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .required("name", defs.subschema::<String>())
            .build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeNode {
    label: String,
    author: Author,
    children: Vec<TreeNode>,
}

impl MessageSchema for TreeNode {
    fn schema_name() -> Option<Cow<'static, str>> {
        Some("TreeNode".into())
    }

    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .required("label", defs.subschema::<String>())
            .required("author", defs.subschema::<Author>())
            .required("children", defs.subschema::<Vec<TreeNode>>())
            .build()
    }
}

impl Message for TreeNode {
    const ACTION: &'static str = "tree.submit";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Byline {
    author: Author,
}

impl MessageSchema for Byline {
    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .required("author", defs.subschema::<Author>())
            .build()
    }
}

impl Message for Byline {
    const ACTION: &'static str = "byline";
}

fn tree_consumer() -> ConsumerSpec<()> {
    let mut builder = ConsumerBuilder::<()>::new("trees");
    builder
        .address("/ws/trees")
        .register_outgoing::<Byline>()
        .unwrap()
        .register_handler(
            |node: TreeNode, _ctx: HandlerContext<()>| async move {
                Reply::message(&Byline { author: node.author })
            },
            Outputs::single::<Byline>(),
            DocMeta::new().summary("Submit a tree").tag("trees"),
        )
        .unwrap();
    builder.build()
}

fn chat() -> ConsumerSpec<switchboard::chat::ChatState> {
    chat_consumer("/ws/chat", DiscriminatorNamespaces::Isolated).unwrap()
}

fn generate(consumers: &[&dyn ChannelDescriptor]) -> Value {
    SchemaGenerator::new(DocsInfo::default())
        .generate(consumers)
        .unwrap()
        .to_json()
        .unwrap()
}

// =============================================================================
// Document structure
// =============================================================================

#[test]
fn chat_document_lists_channel_operations_and_messages() {
    let chat = chat();
    let doc = generate(&[&chat]);

    assert_eq!(doc["asyncapi"], "3.0.0");
    let channel = &doc["channels"]["chat"];
    assert_eq!(channel["address"], "/ws/chat");
    assert_eq!(channel["title"], "Chat");
    assert_eq!(channel["tags"], json!([{"name": "chat"}]));
    assert_eq!(
        channel["messages"]["SendMessage"],
        json!({"$ref": "#/components/messages/SendMessage"})
    );

    let operations = doc["operations"].as_object().unwrap();
    let mut ids: Vec<&str> = operations.keys().map(String::as_str).collect();
    ids.sort_unstable();
    assert_eq!(
        ids,
        vec![
            "chat_event_announcement",
            "chat_receive_chat.history",
            "chat_receive_chat.send",
            "chat_receive_ping",
            "chat_send_chat.history",
            "chat_send_ping",
        ]
    );

    let send_ping = &operations["chat_send_ping"];
    assert_eq!(send_ping["action"], "send");
    assert_eq!(send_ping["channel"], json!({"$ref": "#/channels/chat"}));
    assert_eq!(
        send_ping["messages"],
        json!([{"$ref": "#/channels/chat/messages/Pong"}])
    );
    assert_eq!(operations["chat_receive_ping"]["summary"], "Liveness check");
}

#[test]
fn payloadless_messages_only_require_the_discriminator() {
    let chat = chat();
    let doc = generate(&[&chat]);
    let messages = &doc["components"]["messages"];

    assert_eq!(messages["Ping"]["payload"]["required"], json!(["action"]));
    assert_eq!(
        messages["SendMessage"]["payload"],
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "const": "chat.send"},
                "payload": {"$ref": "#/components/schemas/SendMessage"}
            },
            "required": ["action", "payload"]
        })
    );
}

#[test]
fn timestamps_are_documented_as_rfc3339_strings() {
    let chat = chat();
    let doc = generate(&[&chat]);
    assert_eq!(
        doc["components"]["schemas"]["ChatLine"]["properties"]["sent_at"],
        json!({"type": "string", "description": "RFC 3339 timestamp"})
    );
}

#[test]
fn custom_discriminator_field_is_documented() {
    let chat = chat();
    let doc = SchemaGenerator::new(DocsInfo::default())
        .discriminator_field("type")
        .generate(&[&chat])
        .unwrap()
        .to_json()
        .unwrap();

    let payload = &doc["components"]["messages"]["Ping"]["payload"];
    assert_eq!(payload["properties"]["type"]["const"], "ping");
    assert!(payload["properties"].get("action").is_none());
    assert_eq!(payload["required"], json!(["type"]));
}

#[test]
fn generation_is_deterministic() {
    let chat = chat();
    let trees = tree_consumer();
    let first = SchemaGenerator::new(DocsInfo::default())
        .generate(&[&chat, &trees])
        .unwrap()
        .to_json_string()
        .unwrap();
    let second = SchemaGenerator::new(DocsInfo::default())
        .generate(&[&chat, &trees])
        .unwrap()
        .to_json_string()
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn server_url_becomes_default_server() {
    let info = DocsInfo {
        server_url: Some("wss://chat.example.com/".to_string()),
        ..DocsInfo::default()
    };
    let doc = SchemaGenerator::new(info).generate(&[]).unwrap().to_json().unwrap();
    assert_eq!(
        doc["servers"]["default"],
        json!({"host": "chat.example.com", "protocol": "wss"})
    );
}

#[test]
fn yaml_matches_json() {
    let chat = chat();
    let document = SchemaGenerator::new(DocsInfo::default()).generate(&[&chat]).unwrap();
    let from_yaml: Value = serde_yaml::from_str(&document.to_yaml().unwrap()).unwrap();
    assert_eq!(from_yaml, document.to_json().unwrap());
}

// =============================================================================
// Definitions
// =============================================================================

#[test]
fn recursive_and_shared_definitions_are_hoisted_once() {
    let trees = tree_consumer();
    let doc = generate(&[&trees]);
    let schemas = doc["components"]["schemas"].as_object().unwrap();

    let mut names: Vec<&str> = schemas.keys().map(String::as_str).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Author", "TreeNode"]);
    assert_eq!(
        schemas["TreeNode"]["properties"]["children"]["items"],
        json!({"$ref": "#/components/schemas/TreeNode"})
    );
    assert_eq!(
        schemas["TreeNode"]["properties"]["author"],
        json!({"$ref": "#/components/schemas/Author"})
    );

    // Unnamed message kinds take the pascal-cased action.
    assert!(doc["components"]["messages"].get("Byline").is_some());
    assert!(doc["components"]["messages"].get("TreeNode").is_some());
}

#[test]
fn recursive_payload_validates() {
    let trees = tree_consumer();
    let wire = json!({
        "action": "tree.submit",
        "payload": {
            "label": "root",
            "author": {"name": "ann"},
            "children": [
                {"label": "leaf", "author": {"name": "bo"}, "children": []},
                {"label": "bad", "author": {}, "children": []}
            ]
        }
    })
    .to_string();

    let err = trees
        .registry()
        .union(Direction::Incoming)
        .decode_text(&wire, "action")
        .unwrap_err();
    let entries = err.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, "missing");
    assert_eq!(
        serde_json::to_value(&entries[0].loc).unwrap(),
        json!(["payload", "children", 1, "author", "name"])
    );
}

// =============================================================================
// Conflicts
// =============================================================================

#[test]
fn duplicate_channel_keys_are_rejected() {
    let first = chat();
    let second = chat();
    let result = SchemaGenerator::new(DocsInfo::default()).generate(&[&first, &second]);
    assert!(matches!(result, Err(GenerationError::DuplicateChannel(key)) if key == "chat"));
}

#[test]
fn channel_key_slugs_metadata_name() {
    let mut builder = ConsumerBuilder::<()>::new("ignored");
    builder
        .channel_metadata(ChannelMetadata::new("Order Book / Level 2"))
        .unwrap();
    let spec = builder.build();
    let doc = generate(&[&spec]);
    assert!(doc["channels"].get("order_book_level_2").is_some());
}
