//! HTTP adapters - REST endpoints next to the WebSocket routes.

pub mod events;

pub use events::{events_router, EventsAppState, EVENTS_PATH};
