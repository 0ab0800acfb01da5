//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Invalid timeout")]
    InvalidTimeout,

    #[error("Inbox capacity must be at least 1")]
    InvalidInboxCapacity,

    #[error("Inbound buffer must be at least 1")]
    InvalidInboundBuffer,

    #[error("Outbound buffer must be at least 1")]
    InvalidOutboundBuffer,

    #[error("Discriminator field must be a non-empty name other than 'payload'")]
    InvalidDiscriminatorField,

    #[error("Invalid token grant #{0}, expected token:user_id")]
    InvalidTokenGrant(usize),

    #[error("Invalid docs server URL '{0}'")]
    InvalidServerUrl(String),
}
