//! HTTP routes for the events endpoint.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{health, publish_event, EventsAppState};

/// Route path of the publish endpoint.
pub const EVENTS_PATH: &str = "/api/events";

/// Creates the events router, plus `/health`.
pub fn events_router(state: EventsAppState) -> Router {
    Router::new()
        .route(EVENTS_PATH, post(publish_event))
        .route("/health", get(health))
        .with_state(state)
}
