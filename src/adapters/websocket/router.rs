//! Axum routes: WebSocket upgrade per consumer, plus the protocol document.
//!
//! # Example
//!
//! ```ignore
//! let app = Router::new()
//!     .merge(consumer_router("/ws/chat", chat_dispatcher))
//!     .merge(docs_router(&document)?);
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, OriginalUri, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::application::{AsyncApiDocument, ConnectionDispatcher, GenerationError};
use crate::ports::ConnectionMetadata;

use super::transport::split_socket;

/// Route path of the JSON protocol document.
pub const DOCS_JSON_PATH: &str = "/asyncapi.json";

/// Route path of the YAML protocol document.
pub const DOCS_YAML_PATH: &str = "/asyncapi.yaml";

/// Router serving one consumer at `path`.
pub fn consumer_router<S: Send + 'static>(path: &str, dispatcher: ConnectionDispatcher<S>) -> Router {
    Router::new()
        .route(path, get(ws_upgrade::<S>))
        .with_state(dispatcher)
}

/// Upgrades the request and runs the dispatcher on the socket.
pub async fn ws_upgrade<S: Send + 'static>(
    ws: WebSocketUpgrade,
    State(dispatcher): State<ConnectionDispatcher<S>>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<BTreeMap<String, String>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let metadata = connection_metadata(uri.path(), query, &headers, peer.map(|ConnectInfo(addr)| addr));

    ws.on_upgrade(move |socket| async move {
        let (receiver, sender) = split_socket(socket);
        dispatcher.run(metadata, receiver, sender).await;
    })
}

fn connection_metadata(
    path: &str,
    query: BTreeMap<String, String>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> ConnectionMetadata {
    let mut metadata = ConnectionMetadata::new(path);
    metadata.query = query;
    for (name, value) in headers {
        match value.to_str() {
            Ok(value) => metadata = metadata.with_header(name.as_str(), value),
            Err(_) => {
                tracing::debug!(header = %name, "Skipping non-UTF-8 header");
            }
        }
    }
    metadata.peer = peer;
    metadata
}

#[derive(Clone)]
struct DocsState {
    json: Arc<Value>,
    yaml: Arc<str>,
}

/// Router serving a pre-rendered protocol document.
pub fn docs_router(document: &AsyncApiDocument) -> Result<Router, GenerationError> {
    let state = DocsState {
        json: Arc::new(document.to_json()?),
        yaml: Arc::from(document.to_yaml()?),
    };
    Ok(Router::new()
        .route(DOCS_JSON_PATH, get(docs_json))
        .route(DOCS_YAML_PATH, get(docs_yaml))
        .with_state(state))
}

async fn docs_json(State(state): State<DocsState>) -> Json<Value> {
    Json(state.json.as_ref().clone())
}

async fn docs_yaml(State(state): State<DocsState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/yaml")],
        state.yaml.to_string(),
    )
}
