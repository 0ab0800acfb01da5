//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the dispatcher to external systems:
//! - `auth` - Authenticators (anonymous, static tokens)
//! - `channel_layer` - Channel layers (in-memory, Redis)
//! - `http` - Event publishing and health endpoints
//! - `transport` - In-memory transport pair
//! - `websocket` - Axum WebSocket upgrade and docs routes

pub mod auth;
pub mod channel_layer;
pub mod http;
pub mod transport;
pub mod websocket;

pub use auth::{AllowAnonymous, StaticTokenAuthenticator};
pub use channel_layer::{InMemoryChannelLayer, RedisChannelLayer};
pub use transport::{memory_transport, MemoryClient, TransportEvent};
pub use websocket::{consumer_router, docs_router};
