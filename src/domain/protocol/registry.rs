//! Per-consumer catalog of message kinds.
//!
//! Kinds are keyed by `(direction, action)`. The registry is filled once by
//! the consumer builder and only read afterwards, so it needs no
//! synchronization at runtime.

use std::any::TypeId;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::envelope::{is_reserved_action, Envelope, FrameError, RawEnvelope, PAYLOAD_FIELD};
use super::message::{Direction, Message, MessageKind};
use super::schema::{Definitions, SchemaError};
use super::validation::{validate, ErrorEntry, PathSegment};

/// How discriminators of the `incoming` and `event` directions relate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorNamespaces {
    /// Each direction has its own namespace; an action may appear in both.
    #[default]
    Isolated,
    /// Incoming and event actions share one flat namespace.
    Shared,
}

impl DiscriminatorNamespaces {
    /// Namespace a direction resolves to under this policy.
    fn namespace(&self, direction: Direction) -> Direction {
        match (self, direction) {
            (DiscriminatorNamespaces::Shared, Direction::Event) => Direction::Incoming,
            _ => direction,
        }
    }
}

/// Declaration errors. They abort start-up and are never recovered at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Action '{action}' is already registered for {direction} messages")]
    DuplicateDiscriminator { direction: Direction, action: String },

    #[error("Action '{action}' is reserved for protocol frames")]
    ReservedAction { action: String },

    #[error("Output kind {type_name} is not a registered outgoing message")]
    InvalidOutputKind { type_name: &'static str },

    #[error("Channel metadata for consumer '{consumer}' is already set")]
    DuplicateChannelMetadata { consumer: String },

    #[error(transparent)]
    ConflictingSchemaName(#[from] SchemaError),
}

/// Message kinds of one consumer, plus the definitions their schemas refer to.
#[derive(Debug, Clone, Default)]
pub struct MessageRegistry {
    namespaces: DiscriminatorNamespaces,
    kinds: BTreeMap<(Direction, String), MessageKind>,
    definitions: Definitions,
}

impl MessageRegistry {
    pub fn new(namespaces: DiscriminatorNamespaces) -> Self {
        Self {
            namespaces,
            ..Self::default()
        }
    }

    pub fn namespaces(&self) -> DiscriminatorNamespaces {
        self.namespaces
    }

    /// Registers `M` for `direction`.
    ///
    /// Outgoing hints may be declared repeatedly by several handlers; a
    /// second registration of the same type is a no-op. Any other repeat
    /// of an action within its namespace fails.
    pub fn register<M: Message>(
        &mut self,
        direction: Direction,
    ) -> Result<(), RegistrationError> {
        if is_reserved_action(M::ACTION) {
            return Err(RegistrationError::ReservedAction {
                action: M::ACTION.to_string(),
            });
        }
        let key = (direction, M::ACTION.to_string());

        if let Some(existing) = self.kinds.get(&key) {
            if direction == Direction::OutgoingHint && existing.is::<M>() {
                return Ok(());
            }
            return Err(RegistrationError::DuplicateDiscriminator {
                direction,
                action: M::ACTION.to_string(),
            });
        }

        let namespace = self.namespaces.namespace(direction);
        let collides = self.kinds.keys().any(|(registered, action)| {
            *registered != direction
                && *registered != Direction::OutgoingHint
                && self.namespaces.namespace(*registered) == namespace
                && action == M::ACTION
        });
        if collides {
            return Err(RegistrationError::DuplicateDiscriminator {
                direction,
                action: M::ACTION.to_string(),
            });
        }

        let kind = MessageKind::of::<M>(direction, &mut self.definitions);
        if let Some(conflict) = self.definitions.take_conflicts().into_iter().next() {
            return Err(conflict.into());
        }

        self.kinds.insert(key, kind);
        Ok(())
    }

    pub fn get(&self, direction: Direction, action: &str) -> Option<&MessageKind> {
        self.kinds.get(&(direction, action.to_string()))
    }

    /// True if the type with `type_id` is registered for `direction`.
    pub fn contains_type(&self, direction: Direction, type_id: TypeId) -> bool {
        self.kinds
            .iter()
            .any(|((d, _), kind)| *d == direction && kind.type_id == type_id)
    }

    /// Kinds of one direction in action order.
    pub fn kinds(&self, direction: Direction) -> impl Iterator<Item = &MessageKind> {
        self.kinds
            .iter()
            .filter(move |((d, _), _)| *d == direction)
            .map(|(_, kind)| kind)
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Union decoder over all kinds of `direction`.
    pub fn union(&self, direction: Direction) -> MessageUnion<'_> {
        MessageUnion {
            registry: self,
            direction,
        }
    }
}

/// Discriminated union of the kinds registered for one direction.
///
/// Decoding resolves the discriminator first, then validates the payload
/// against that kind's schema only.
#[derive(Debug, Clone, Copy)]
pub struct MessageUnion<'a> {
    registry: &'a MessageRegistry,
    direction: Direction,
}

impl<'a> MessageUnion<'a> {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Decodes and validates an envelope. `field` names the discriminator
    /// key for error locations.
    pub fn decode(
        &self,
        raw: RawEnvelope,
        field: &str,
    ) -> Result<(&'a MessageKind, Envelope), FrameError> {
        let Some(kind) = self.registry.get(self.direction, &raw.action) else {
            return Err(FrameError::UnknownAction {
                field: field.to_string(),
                action: raw.action,
            });
        };
        let defs = self.registry.definitions();

        let payload = match raw.payload {
            Some(payload) => payload,
            None if kind.payload.accepts_absent(defs) => Value::Null,
            None => {
                return Err(FrameError::Validation(vec![ErrorEntry::new(
                    "missing",
                    vec![PathSegment::from(PAYLOAD_FIELD)],
                    "Field required",
                )]))
            }
        };

        let problems = validate(&payload, &kind.payload, defs, &[PathSegment::from(PAYLOAD_FIELD)]);
        if !problems.is_empty() {
            return Err(FrameError::Validation(problems));
        }

        Ok((kind, Envelope::new(raw.action, payload)))
    }

    /// Parses wire text and decodes it in one step.
    pub fn decode_text(
        &self,
        text: &str,
        field: &str,
    ) -> Result<(&'a MessageKind, Envelope), FrameError> {
        self.decode(RawEnvelope::parse(text, field)?, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::schema::{MessageSchema, ObjectSchema, Schema};
    use serde_json::json;
    use std::borrow::Cow;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping;

    impl MessageSchema for Ping {
        fn json_schema(_defs: &mut Definitions) -> Schema {
            Schema::null()
        }
    }

    impl Message for Ping {
        const ACTION: &'static str = "ping";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Say {
        text: String,
        mood: Option<String>,
    }

    impl MessageSchema for Say {
        fn schema_name() -> Option<Cow<'static, str>> {
            Some("Say".into())
        }

        fn json_schema(defs: &mut Definitions) -> Schema {
            ObjectSchema::new()
                .required("text", defs.subschema::<String>())
                .optional("mood", defs.subschema::<Option<String>>())
                .build()
        }
    }

    impl Message for Say {
        const ACTION: &'static str = "say";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct SayAgain {
        text: String,
    }

    impl MessageSchema for SayAgain {
        fn json_schema(defs: &mut Definitions) -> Schema {
            ObjectSchema::new().required("text", defs.subschema::<String>()).build()
        }
    }

    impl Message for SayAgain {
        const ACTION: &'static str = "say";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct FakeSay;

    impl MessageSchema for FakeSay {
        fn schema_name() -> Option<Cow<'static, str>> {
            Some("Say".into())
        }

        fn json_schema(_defs: &mut Definitions) -> Schema {
            Schema::null()
        }
    }

    impl Message for FakeSay {
        const ACTION: &'static str = "fake_say";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Done;

    impl MessageSchema for Done {
        fn json_schema(_defs: &mut Definitions) -> Schema {
            Schema::null()
        }
    }

    impl Message for Done {
        const ACTION: &'static str = "group_complete";
    }

    #[test]
    fn protocol_actions_cannot_be_registered() {
        let mut registry = MessageRegistry::default();
        for direction in [Direction::Incoming, Direction::OutgoingHint, Direction::Event] {
            assert_eq!(
                registry.register::<Done>(direction).unwrap_err(),
                RegistrationError::ReservedAction {
                    action: "group_complete".to_string()
                }
            );
        }
        assert_eq!(registry.kinds(Direction::Incoming).count(), 0);
    }

    #[test]
    fn duplicate_action_in_same_direction_fails() {
        let mut registry = MessageRegistry::default();
        registry.register::<Say>(Direction::Incoming).unwrap();
        let err = registry.register::<SayAgain>(Direction::Incoming).unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::DuplicateDiscriminator { direction: Direction::Incoming, .. }
        ));
    }

    #[test]
    fn isolated_namespaces_allow_reuse_across_directions() {
        let mut registry = MessageRegistry::new(DiscriminatorNamespaces::Isolated);
        registry.register::<Say>(Direction::Incoming).unwrap();
        assert!(registry.register::<SayAgain>(Direction::Event).is_ok());
    }

    #[test]
    fn shared_namespace_rejects_reuse_across_directions() {
        let mut registry = MessageRegistry::new(DiscriminatorNamespaces::Shared);
        registry.register::<Say>(Direction::Incoming).unwrap();
        assert!(registry.register::<SayAgain>(Direction::Event).is_err());
    }

    #[test]
    fn outgoing_hints_never_collide_with_incoming() {
        let mut registry = MessageRegistry::new(DiscriminatorNamespaces::Shared);
        registry.register::<Say>(Direction::Incoming).unwrap();
        registry.register::<Say>(Direction::OutgoingHint).unwrap();
        registry.register::<Say>(Direction::OutgoingHint).unwrap();
        assert_eq!(registry.kinds(Direction::OutgoingHint).count(), 1);
    }

    #[test]
    fn conflicting_schema_name_fails() {
        let mut registry = MessageRegistry::default();
        registry.register::<Say>(Direction::Incoming).unwrap();
        let err = registry.register::<FakeSay>(Direction::Incoming).unwrap_err();
        assert!(matches!(err, RegistrationError::ConflictingSchemaName(_)));
    }

    #[test]
    fn decode_resolves_discriminator_then_validates() {
        let mut registry = MessageRegistry::default();
        registry.register::<Ping>(Direction::Incoming).unwrap();
        registry.register::<Say>(Direction::Incoming).unwrap();

        let union = registry.union(Direction::Incoming);
        let (kind, envelope) = union
            .decode_text(r#"{"action":"say","payload":{"text":"hi"}}"#, "action")
            .unwrap();
        assert!(kind.is::<Say>());
        assert_eq!(envelope.payload, json!({"text": "hi"}));
    }

    #[test]
    fn payloadless_kind_accepts_missing_payload() {
        let mut registry = MessageRegistry::default();
        registry.register::<Ping>(Direction::Incoming).unwrap();
        let (kind, envelope) = registry
            .union(Direction::Incoming)
            .decode_text(r#"{"action":"ping"}"#, "action")
            .unwrap();
        assert!(kind.is::<Ping>());
        assert_eq!(envelope.payload, Value::Null);
        assert_eq!(envelope.payload_as::<Ping>().unwrap(), Ping);
    }

    #[test]
    fn missing_payload_for_object_kind_is_reported() {
        let mut registry = MessageRegistry::default();
        registry.register::<Say>(Direction::Incoming).unwrap();
        let err = registry
            .union(Direction::Incoming)
            .decode_text(r#"{"action":"say"}"#, "action")
            .unwrap_err();
        let entries = err.entries();
        assert_eq!(entries[0].kind, "missing");
        assert_eq!(entries[0].loc, vec![PathSegment::from("payload")]);
    }

    #[test]
    fn missing_field_location_is_qualified() {
        let mut registry = MessageRegistry::default();
        registry.register::<Say>(Direction::Incoming).unwrap();
        let err = registry
            .union(Direction::Incoming)
            .decode_text(r#"{"action":"say","payload":{"mood":"ok"}}"#, "action")
            .unwrap_err();
        let entries = err.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].loc,
            vec![PathSegment::from("payload"), PathSegment::from("text")]
        );
    }

    #[test]
    fn unknown_action_is_reported_with_field() {
        let registry = MessageRegistry::default();
        let err = registry
            .union(Direction::Incoming)
            .decode_text(r#"{"type":"bogus"}"#, "type")
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::UnknownAction {
                field: "type".to_string(),
                action: "bogus".to_string()
            }
        );
    }

    #[test]
    fn event_union_does_not_see_incoming_kinds() {
        let mut registry = MessageRegistry::default();
        registry.register::<Ping>(Direction::Incoming).unwrap();
        let err = registry
            .union(Direction::Event)
            .decode_text(r#"{"action":"ping"}"#, "action")
            .unwrap_err();
        assert!(matches!(err, FrameError::UnknownAction { .. }));
    }

    #[test]
    fn contains_type_checks_direction() {
        let mut registry = MessageRegistry::default();
        registry.register::<Say>(Direction::OutgoingHint).unwrap();
        assert!(registry.contains_type(Direction::OutgoingHint, TypeId::of::<Say>()));
        assert!(!registry.contains_type(Direction::Incoming, TypeId::of::<Say>()));
    }

    #[test]
    fn encoded_payload_decodes_to_equal_value() {
        let mut registry = MessageRegistry::default();
        registry.register::<Say>(Direction::Incoming).unwrap();
        let original = Say {
            text: "hello".to_string(),
            mood: Some("calm".to_string()),
        };
        let wire = Envelope::from_message(&original).unwrap().encode("action");
        let (_, decoded) = registry
            .union(Direction::Incoming)
            .decode_text(&wire, "action")
            .unwrap();
        assert_eq!(decoded.payload_as::<Say>().unwrap(), original);
    }
}
