//! Foundation module - Shared domain primitives.
//!
//! Identifiers, lifecycle states, authentication types and error values
//! used by every other layer.

mod auth;
mod connection_state;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use auth::{AuthError, Principal};
pub use connection_state::ConnectionState;
pub use errors::{DomainError, ValidationError};
pub use ids::{ConnectionId, GroupName, MAX_GROUP_NAME_LEN};
pub use state_machine::{InvalidTransition, StateMachine};
pub use timestamp::Timestamp;
