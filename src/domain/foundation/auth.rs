//! Authentication types for the domain layer.
//!
//! A [`Principal`] is whatever identity the authenticator resolved for a
//! connection. The dispatcher never inspects it beyond logging; handlers read
//! it through their context to make permission decisions.
//!
//! # Example
//!
//! ```ignore
//! let principal = Principal::user("user-123").with_display_name("Alice");
//! assert!(principal.is_authenticated());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity resolved for a connection.
///
/// Anonymous connections are represented explicitly rather than by an
/// `Option`, so handlers always have a principal to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Principal {
    /// User identifier from the auth backend, `None` for anonymous.
    pub user_id: Option<String>,

    /// Display name if the backend provides one.
    pub display_name: Option<String>,

    /// Free-form claims (roles, tenant, ...).
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

impl Principal {
    /// The anonymous principal.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A principal for an authenticated user.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Adds a claim.
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }

    /// Returns true unless this is the anonymous principal.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Returns the display name, the user id, or `"anonymous"`.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.user_id.as_deref())
            .unwrap_or("anonymous")
    }
}

/// Authentication errors that can occur while accepting a connection.
///
/// These errors are **domain-centric** - they describe what went wrong
/// from the application's perspective, not the auth backend's.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credentials were presented.
    #[error("Authentication credentials were not provided")]
    MissingCredentials,

    /// Credentials were presented but rejected.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Authenticated, but not allowed to open this connection.
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// The authentication service is unavailable.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// HTTP-style status code reported in the authentication frame.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidCredentials => 401,
            AuthError::InsufficientPermissions => 403,
            AuthError::ServiceUnavailable(_) => 503,
        }
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}
