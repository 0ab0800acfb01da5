//! Chat wire messages.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{GroupName, Timestamp};
use crate::domain::protocol::{Definitions, Message, MessageSchema, ObjectSchema, Schema};

/// Liveness check sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping;

impl MessageSchema for Ping {
    fn json_schema(_defs: &mut Definitions) -> Schema {
        Schema::null()
    }
}

impl Message for Ping {
    const ACTION: &'static str = "ping";

    fn summary() -> Option<&'static str> {
        Some("Liveness check")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong;

impl MessageSchema for Pong {
    fn json_schema(_defs: &mut Definitions) -> Schema {
        Schema::null()
    }
}

impl Message for Pong {
    const ACTION: &'static str = "pong";
}

/// Posts a line to a joined room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessage {
    pub room: GroupName,
    pub text: String,
}

impl MessageSchema for SendMessage {
    fn schema_name() -> Option<Cow<'static, str>> {
        Some("SendMessage".into())
    }

    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .required("room", defs.subschema::<GroupName>().describe("A room the connection joined"))
            .required("text", defs.subschema::<String>())
            .deny_unknown()
            .build()
    }
}

impl Message for SendMessage {
    const ACTION: &'static str = "chat.send";

    fn summary() -> Option<&'static str> {
        Some("Post a message to a room")
    }
}

/// A line posted to a room, fanned out to its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub room: GroupName,
    pub author: String,
    pub text: String,
    pub sent_at: Timestamp,
}

impl MessageSchema for ChatLine {
    fn schema_name() -> Option<Cow<'static, str>> {
        Some("ChatLine".into())
    }

    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .required("room", defs.subschema::<GroupName>())
            .required("author", defs.subschema::<String>())
            .required("text", defs.subschema::<String>())
            .required("sent_at", defs.subschema::<Timestamp>())
            .build()
    }
}

impl Message for ChatLine {
    const ACTION: &'static str = "chat.message";
}

/// Replays the lines this connection posted, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    pub limit: Option<u32>,
}

impl MessageSchema for History {
    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .optional("limit", defs.subschema::<Option<u32>>())
            .build()
    }
}

impl Message for History {
    const ACTION: &'static str = "chat.history";
}

/// Server-side announcement pushed to a room through the channel layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub text: String,
}

impl MessageSchema for Announcement {
    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .required("text", defs.subschema::<String>())
            .build()
    }
}

impl Message for Announcement {
    const ACTION: &'static str = "announcement";
}

/// Announcement as shown to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub text: String,
    pub received_by: String,
}

impl MessageSchema for Notice {
    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .required("text", defs.subschema::<String>())
            .required("received_by", defs.subschema::<String>())
            .build()
    }
}

impl Message for Notice {
    const ACTION: &'static str = "notice";
}
