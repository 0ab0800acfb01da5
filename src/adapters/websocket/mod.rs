//! WebSocket adapters - axum upgrade routes and socket transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  consumer_router("/ws/chat")  ──  GET upgrade         │
//! └──────────────────────────────────────────────────────┘
//!                          │ split_socket
//!                          ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  AxumFrameReceiver / AxumFrameSender                  │
//! │  (FrameReceiver / FrameSender ports)                  │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!                 ConnectionDispatcher::run
//! ```

mod router;
mod transport;

pub use router::{consumer_router, docs_router, ws_upgrade, DOCS_JSON_PATH, DOCS_YAML_PATH};
pub use transport::{split_socket, AxumFrameReceiver, AxumFrameSender};
