//! HTTP handlers for publishing events into the channel layer.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::{BroadcastCoordinator, BroadcastTarget};
use crate::domain::protocol::{is_reserved_action, Envelope};
use crate::ports::ChannelLayerError;

use super::dto::{ErrorResponse, PublishEventRequest, PublishEventResponse};

/// Shared state for the events endpoint.
#[derive(Clone)]
pub struct EventsAppState {
    pub coordinator: Arc<BroadcastCoordinator>,
    pub layer_alias: Arc<str>,
}

impl EventsAppState {
    pub fn new(coordinator: Arc<BroadcastCoordinator>, layer_alias: impl Into<Arc<str>>) -> Self {
        Self {
            coordinator,
            layer_alias: layer_alias.into(),
        }
    }
}

/// POST /api/events - Publish an event to every member of a group
pub async fn publish_event(
    State(state): State<EventsAppState>,
    Json(req): Json<PublishEventRequest>,
) -> Response {
    let action = req.action.trim();
    if action.is_empty() || is_reserved_action(action) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request(format!("Invalid event action '{}'", req.action))),
        )
            .into_response();
    }

    let target = BroadcastTarget::new(req.group.clone()).via(state.layer_alias.as_ref());
    let envelope = Envelope::new(action, req.payload);

    match state.coordinator.send_event(&target, envelope).await {
        Ok(delivered) => {
            tracing::info!(group = %req.group, action, delivered, "Event published");
            (StatusCode::ACCEPTED, Json(PublishEventResponse { delivered })).into_response()
        }
        Err(e) => handle_layer_error(e),
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn handle_layer_error(error: ChannelLayerError) -> Response {
    tracing::warn!(error = %error, "Event publish failed");
    if error.is_transient() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::unavailable(error.to_string())),
        )
            .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal(error.to_string())),
        )
            .into_response()
    }
}
