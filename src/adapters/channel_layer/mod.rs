//! Channel layer adapters.
//!
//! - `in_memory` - Single-process inboxes and groups
//! - `redis` - Redis sets for membership, pub/sub for delivery

mod in_memory;
mod redis;

pub use self::redis::RedisChannelLayer;
pub use in_memory::{InMemoryChannelLayer, DEFAULT_INBOX_CAPACITY};
