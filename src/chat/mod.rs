//! Chat consumer - rooms, history replay, and announcements.
//!
//! Connections join `lobby`, the room named by the `room` query parameter,
//! and a personal `user.<id>` group when authenticated.

mod consumer;
mod messages;

pub use consumer::{chat_consumer, ChatState, LOBBY, MAX_TEXT_LEN};
pub use messages::{Announcement, ChatLine, History, Notice, Ping, Pong, SendMessage};
