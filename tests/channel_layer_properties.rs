//! Property tests for group membership, exclusion and envelope decoding.

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use switchboard::adapters::channel_layer::InMemoryChannelLayer;
use switchboard::domain::foundation::{ConnectionId, GroupName};
use switchboard::domain::protocol::{
    Definitions, Direction, DiscriminatorNamespaces, Envelope, Message, MessageRegistry,
    MessageSchema, ObjectSchema, Schema,
};
use switchboard::ports::{ChannelLayer, ChannelMessage};

const CONNECTIONS: usize = 5;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn room() -> GroupName {
    GroupName::new("room").unwrap()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Say {
    text: String,
    count: u32,
    tags: Vec<String>,
}

impl MessageSchema for Say {
    fn json_schema(defs: &mut Definitions) -> Schema {
        ObjectSchema::new()
            .required("text", defs.subschema::<String>())
            .required("count", defs.subschema::<u32>())
            .required("tags", defs.subschema::<Vec<String>>())
            .deny_unknown()
            .build()
    }
}

impl Message for Say {
    const ACTION: &'static str = "say";
}

proptest! {
    #[test]
    fn membership_matches_set_model(
        ops in proptest::collection::vec((0..CONNECTIONS, any::<bool>()), 0..40)
    ) {
        let rt = runtime();
        rt.block_on(async {
            let layer = InMemoryChannelLayer::default();
            let ids: Vec<ConnectionId> = (0..CONNECTIONS).map(|_| ConnectionId::new()).collect();
            let mut model = BTreeSet::new();

            for (index, join) in ops {
                let id = ids[index];
                if join {
                    layer.join_group(&room(), id).await.unwrap();
                    model.insert(id);
                } else {
                    layer.leave_group(&room(), id).await.unwrap();
                    model.remove(&id);
                }
                let members: BTreeSet<ConnectionId> =
                    layer.group_members(&room()).await.unwrap().into_iter().collect();
                prop_assert_eq!(&members, &model);
            }
            Ok(())
        })?;
    }

    #[test]
    fn repeated_join_is_idempotent(repeats in 1usize..6) {
        let rt = runtime();
        rt.block_on(async {
            let layer = InMemoryChannelLayer::default();
            let id = ConnectionId::new();
            for _ in 0..repeats {
                layer.join_group(&room(), id).await.unwrap();
            }
            prop_assert_eq!(layer.group_members(&room()).await.unwrap(), vec![id]);

            for _ in 0..repeats {
                layer.leave_group(&room(), id).await.unwrap();
            }
            prop_assert!(layer.group_members(&room()).await.unwrap().is_empty());
            Ok(())
        })?;
    }

    #[test]
    fn broadcast_skips_only_the_excluded_member(
        joined in proptest::collection::vec(any::<bool>(), CONNECTIONS),
        exclude in proptest::option::of(0..CONNECTIONS),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let layer = InMemoryChannelLayer::default();
            let mut connections = Vec::new();
            for member in &joined {
                let id = ConnectionId::new();
                let inbox = layer.register(id).await.unwrap();
                if *member {
                    layer.join_group(&room(), id).await.unwrap();
                }
                connections.push((id, *member, inbox));
            }

            let excluded = exclude.map(|index| connections[index].0);
            let message = ChannelMessage::Broadcast(Envelope::new("tick", serde_json::json!({})));
            let delivered = layer.broadcast_to_group(&room(), message, excluded).await.unwrap();

            let expected = connections
                .iter()
                .filter(|(id, member, _)| *member && Some(*id) != excluded)
                .count();
            prop_assert_eq!(delivered, expected);

            for (id, member, inbox) in connections.iter_mut() {
                let received = inbox.try_recv().is_ok();
                prop_assert_eq!(received, *member && Some(*id) != excluded);
                prop_assert!(inbox.try_recv().is_err());
            }
            Ok(())
        })?;
    }

    #[test]
    fn typed_messages_survive_encode_and_decode(
        text in ".{0,40}",
        count in any::<u32>(),
        tags in proptest::collection::vec("[a-z]{1,8}", 0..4),
    ) {
        let mut registry = MessageRegistry::new(DiscriminatorNamespaces::Isolated);
        registry.register::<Say>(Direction::Incoming).unwrap();

        let original = Say { text, count, tags };
        let wire = Envelope::from_message(&original).unwrap().encode("action");

        let (kind, envelope) = registry.union(Direction::Incoming).decode_text(&wire, "action").unwrap();
        prop_assert!(kind.is::<Say>());
        prop_assert_eq!(envelope.payload_as::<Say>().unwrap(), original);
    }
}
