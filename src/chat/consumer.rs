//! Chat consumer declaration and handlers.

use futures::stream;

use crate::application::{
    ChannelMetadata, ConsumerBuilder, ConsumerSpec, DocMeta, HandlerContext, HandlerError,
    HandlerResult, Outputs, Reply,
};
use crate::domain::foundation::{DomainError, GroupName, Timestamp};
use crate::domain::protocol::{DiscriminatorNamespaces, RegistrationError};

use super::messages::{Announcement, ChatLine, History, Notice, Ping, Pong, SendMessage};

/// Room every chat connection joins.
pub const LOBBY: &str = "lobby";

/// Longest accepted chat line, in characters.
pub const MAX_TEXT_LEN: usize = 2000;

/// Per-connection chat state.
#[derive(Debug, Default)]
pub struct ChatState {
    pub posted: Vec<ChatLine>,
}

/// Builds the chat consumer served at `address`.
pub fn chat_consumer(
    address: &str,
    namespaces: DiscriminatorNamespaces,
) -> Result<ConsumerSpec<ChatState>, RegistrationError> {
    let mut builder = ConsumerBuilder::<ChatState>::new("chat");
    builder
        .namespaces(namespaces)
        .address(address)
        .groups(GroupName::new(LOBBY).ok())
        .group_resolver(|principal, metadata| {
            let mut groups = Vec::new();
            if let Some(room) = metadata.query_param("room") {
                match GroupName::new(room) {
                    Ok(room) => groups.push(room),
                    Err(e) => tracing::debug!(error = %e, "Ignoring invalid room"),
                }
            }
            if let Some(user) = &principal.user_id {
                groups.extend(GroupName::new(format!("user.{}", user)));
            }
            groups
        });

    builder
        .channel_metadata(
            ChannelMetadata::new("Chat")
                .description("Rooms with fan-out to every member")
                .tag("chat"),
        )?
        .register_outgoing::<Pong>()?
        .register_outgoing::<ChatLine>()?
        .register_outgoing::<Notice>()?
        .register_handler(ping, Outputs::single::<Pong>(), DocMeta::new())?
        .register_handler(
            send_message,
            Outputs::None,
            DocMeta::new().description("Broadcasts a `chat.message` to every member of the room"),
        )?
        .register_handler(
            history,
            Outputs::stream::<ChatLine>(),
            DocMeta::new().summary("Replay own messages"),
        )?
        .register_event_handler(
            announcement,
            Outputs::single::<Notice>(),
            DocMeta::new().summary("Relay an announcement"),
        )?;

    Ok(builder.build())
}

async fn ping(_: Ping, _ctx: HandlerContext<ChatState>) -> HandlerResult {
    Reply::message(&Pong)
}

async fn send_message(msg: SendMessage, ctx: HandlerContext<ChatState>) -> HandlerResult {
    let text = msg.text.trim();
    if text.is_empty() {
        return Err(DomainError::for_field("text", "empty_text", "Message text is empty").into());
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(DomainError::for_field("text", "text_too_long", "Message text is too long").into());
    }
    if !ctx.is_member(&msg.room).await {
        return Err(DomainError::for_field("room", "not_member", "Not a member of this room").into());
    }

    let line = ChatLine {
        room: msg.room.clone(),
        author: ctx.principal().label().to_string(),
        text: text.to_string(),
        sent_at: Timestamp::now(),
    };
    ctx.broadcast(&msg.room, &line).await?;
    ctx.state().await.posted.push(line);
    Ok(Reply::None)
}

async fn history(msg: History, ctx: HandlerContext<ChatState>) -> HandlerResult {
    let posted = ctx.state().await.posted.clone();
    let skip = match msg.limit {
        Some(limit) => posted.len().saturating_sub(limit as usize),
        None => 0,
    };
    Reply::stream(stream::iter(posted.into_iter().skip(skip).map(Ok::<_, HandlerError>)))
}

async fn announcement(msg: Announcement, ctx: HandlerContext<ChatState>) -> HandlerResult {
    Reply::message(&Notice {
        text: msg.text,
        received_by: ctx.principal().label().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ChannelDescriptor;
    use crate::domain::foundation::Principal;
    use crate::domain::protocol::Direction;
    use crate::ports::ConnectionMetadata;

    #[test]
    fn consumer_registers_every_kind() {
        let spec = chat_consumer("/ws/chat", DiscriminatorNamespaces::Isolated).unwrap();
        let registry = spec.registry();
        assert_eq!(registry.kinds(Direction::Incoming).count(), 3);
        assert_eq!(registry.kinds(Direction::OutgoingHint).count(), 3);
        assert!(registry.get(Direction::Event, "announcement").is_some());
        assert_eq!(spec.address(), Some("/ws/chat"));
    }

    #[test]
    fn groups_follow_query_and_principal() {
        let spec = chat_consumer("/ws/chat", DiscriminatorNamespaces::Isolated).unwrap();
        let metadata = ConnectionMetadata::new("/ws/chat").with_query("room", "rust");
        let groups = spec.groups_for(&Principal::user("ann"), &metadata);
        let names: Vec<&str> = groups.iter().map(GroupName::as_str).collect();
        assert_eq!(names, vec!["lobby", "rust", "user.ann"]);
    }

    #[test]
    fn invalid_room_is_skipped() {
        let spec = chat_consumer("/ws/chat", DiscriminatorNamespaces::Isolated).unwrap();
        let metadata = ConnectionMetadata::new("/ws/chat").with_query("room", "no spaces");
        let groups = spec.groups_for(&Principal::anonymous(), &metadata);
        assert_eq!(groups.len(), 1);
    }
}
