//! Message kinds and directions.

use std::any::TypeId;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::schema::{Definitions, MessageSchema, Schema};

/// Which way a message kind travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sent by the client, handled by a registered handler.
    Incoming,
    /// Sent by the server; registered for validation of declared outputs and docs.
    OutgoingHint,
    /// Delivered through the channel layer and handled by an event handler.
    Event,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Incoming => "incoming",
            Direction::OutgoingHint => "outgoing-hint",
            Direction::Event => "event",
        };
        write!(f, "{}", s)
    }
}

/// A typed message: a payload type plus its discriminator value.
///
/// Unit structs serialize to `null`, which is sent as an envelope without a
/// `payload` key:
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Pong;
///
/// impl Message for Pong {
///     const ACTION: &'static str = "pong";
/// }
/// ```
pub trait Message: Serialize + DeserializeOwned + MessageSchema + Send + Sync + 'static {
    /// Discriminator value identifying this kind on the wire.
    const ACTION: &'static str;

    /// One-line summary used in the protocol document.
    fn summary() -> Option<&'static str> {
        None
    }
}

/// Registered description of one message kind. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageKind {
    /// Discriminator value.
    pub action: String,
    pub direction: Direction,
    /// Name of the message in the protocol document.
    pub name: String,
    /// Payload schema, usually a reference into the consumer's definitions.
    pub payload: Schema,
    pub summary: Option<String>,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl MessageKind {
    /// Describes `M`, hoisting its schema into `defs`.
    pub fn of<M: Message>(direction: Direction, defs: &mut Definitions) -> Self {
        let name = M::schema_name()
            .map(|n| n.into_owned())
            .unwrap_or_else(|| pascal_case(M::ACTION));
        Self {
            action: M::ACTION.to_string(),
            direction,
            name,
            payload: defs.subschema::<M>(),
            summary: M::summary().map(str::to_string),
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
        }
    }

    /// True if this kind was built from `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }
}

/// `"chat.send_message"` → `"ChatSendMessage"`.
pub(crate) fn pascal_case(action: &str) -> String {
    action
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::schema::ObjectSchema;
    use std::borrow::Cow;

    #[derive(Serialize, Deserialize)]
    struct Ping;

    impl MessageSchema for Ping {
        fn json_schema(_defs: &mut Definitions) -> Schema {
            Schema::null()
        }
    }

    impl Message for Ping {
        const ACTION: &'static str = "ping";
    }

    #[derive(Serialize, Deserialize)]
    struct Say {
        text: String,
    }

    impl MessageSchema for Say {
        fn schema_name() -> Option<Cow<'static, str>> {
            Some("SayPayload".into())
        }

        fn json_schema(defs: &mut Definitions) -> Schema {
            ObjectSchema::new()
                .required("text", defs.subschema::<String>())
                .build()
        }
    }

    impl Message for Say {
        const ACTION: &'static str = "say";

        fn summary() -> Option<&'static str> {
            Some("Say something")
        }
    }

    #[test]
    fn unnamed_kind_uses_pascal_cased_action() {
        let mut defs = Definitions::new();
        let kind = MessageKind::of::<Ping>(Direction::Incoming, &mut defs);
        assert_eq!(kind.name, "Ping");
        assert_eq!(kind.payload, Schema::null());
        assert!(kind.is::<Ping>());
        assert!(!kind.is::<Say>());
    }

    #[test]
    fn named_kind_references_definition() {
        let mut defs = Definitions::new();
        let kind = MessageKind::of::<Say>(Direction::Event, &mut defs);
        assert_eq!(kind.name, "SayPayload");
        assert_eq!(kind.payload, Schema::reference("SayPayload"));
        assert_eq!(kind.summary.as_deref(), Some("Say something"));
        assert!(defs.get("SayPayload").is_some());
    }

    #[test]
    fn pascal_case_splits_on_separators() {
        assert_eq!(pascal_case("chat.send_message"), "ChatSendMessage");
        assert_eq!(pascal_case("ping"), "Ping");
        assert_eq!(pascal_case("a--b"), "AB");
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::OutgoingHint.to_string(), "outgoing-hint");
        assert_eq!(Direction::Incoming.to_string(), "incoming");
        assert_eq!(Direction::Event.to_string(), "event");
    }
}
