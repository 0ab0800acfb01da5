//! Switchboard - Typed message routing for WebSocket consumers
//!
//! A consumer declares the message kinds it accepts and emits; each connection
//! is served by a dispatcher that validates frames, runs handlers, and fans
//! messages out to groups through a pluggable channel layer. The same
//! declarations produce an AsyncAPI document.

pub mod adapters;
pub mod application;
pub mod chat;
pub mod config;
pub mod domain;
pub mod ports;
pub mod server;
pub mod telemetry;
