//! Events endpoint - server-side publishing into consumer groups.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, PublishEventRequest, PublishEventResponse};
pub use handlers::EventsAppState;
pub use routes::{events_router, EVENTS_PATH};
