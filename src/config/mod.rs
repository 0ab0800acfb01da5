//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `SWITCHBOARD` prefix and nested values use double underscores as separators.
//! Every section has defaults, so an empty environment yields a working
//! single-process server.
//!
//! # Example
//!
//! ```no_run
//! use switchboard::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod auth;
mod channel_layer;
mod docs;
mod error;
mod protocol;
mod redis;
mod server;

pub use auth::{AuthConfig, TokenGrant};
pub use channel_layer::{ChannelLayerBackend, ChannelLayerConfig};
pub use docs::DocsConfig;
pub use error::{ConfigError, ValidationError};
pub use protocol::ProtocolConfig;
pub use redis::RedisConfig;
pub use server::{Environment, LogFormat, ServerConfig};

use serde::Deserialize;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SWITCHBOARD";

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Wire protocol behavior
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Channel layer backend (memory or Redis)
    #[serde(default)]
    pub channel_layer: ChannelLayerConfig,

    /// Connection authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Protocol document
    #[serde(default)]
    pub docs: DocsConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SWITCHBOARD` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `SWITCHBOARD__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SWITCHBOARD__CHANNEL_LAYER__REDIS__URL=...` -> `channel_layer.redis.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix(ENV_PREFIX)
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load and validate in one step
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.protocol.validate()?;
        self.channel_layer.validate()?;
        self.auth.validate(&self.server.environment)?;
        self.docs.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::FlushMode;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SWITCHBOARD__SERVER__PORT",
        "SWITCHBOARD__SERVER__ENVIRONMENT",
        "SWITCHBOARD__SERVER__LOG_FORMAT",
        "SWITCHBOARD__PROTOCOL__SEND_COMPLETION",
        "SWITCHBOARD__PROTOCOL__FLUSH",
        "SWITCHBOARD__PROTOCOL__DISCRIMINATOR_FIELD",
        "SWITCHBOARD__CHANNEL_LAYER__BACKEND",
        "SWITCHBOARD__CHANNEL_LAYER__REDIS__URL",
        "SWITCHBOARD__AUTH__TOKENS",
    ];

    /// Helper to clear environment variables after testing
    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_with_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = AppConfig::load();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.protocol.discriminator_field, "action");
        assert_eq!(config.channel_layer.backend, ChannelLayerBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_nested_sections() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("SWITCHBOARD__SERVER__PORT", "3000");
        env::set_var("SWITCHBOARD__SERVER__LOG_FORMAT", "json");
        env::set_var("SWITCHBOARD__PROTOCOL__SEND_COMPLETION", "true");
        env::set_var("SWITCHBOARD__PROTOCOL__FLUSH", "end_of_cycle");
        env::set_var("SWITCHBOARD__CHANNEL_LAYER__BACKEND", "redis");
        env::set_var("SWITCHBOARD__CHANNEL_LAYER__REDIS__URL", "redis://cache:6379");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert!(config.protocol.send_completion);
        assert_eq!(config.protocol.flush, FlushMode::EndOfCycle);
        assert_eq!(config.channel_layer.backend, ChannelLayerBackend::Redis);
        assert_eq!(config.channel_layer.redis.url, "redis://cache:6379");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("SWITCHBOARD__SERVER__ENVIRONMENT", "production");
        env::set_var("SWITCHBOARD__AUTH__TOKENS", "abc:alice");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_surfaces_section_errors() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("SWITCHBOARD__PROTOCOL__DISCRIMINATOR_FIELD", "payload");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidDiscriminatorField)
        );
    }
}
