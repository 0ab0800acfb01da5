//! Request and response bodies for the events endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::GroupName;

/// Body of `POST /api/events`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishEventRequest {
    pub group: GroupName,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

/// Number of inboxes the event reached.
#[derive(Debug, Clone, Serialize)]
pub struct PublishEventResponse {
    pub delivered: usize,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: "SERVICE_UNAVAILABLE".to_string(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
        }
    }
}
