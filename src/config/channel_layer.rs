//! Channel layer configuration

use serde::Deserialize;

use super::error::ValidationError;
use super::redis::RedisConfig;
use crate::adapters::channel_layer::DEFAULT_INBOX_CAPACITY;

/// Which channel layer backs the default alias
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayerBackend {
    /// Single-process, no external service
    #[default]
    Memory,
    /// Redis sets and pub/sub, shared between processes
    Redis,
}

/// Channel layer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelLayerConfig {
    #[serde(default)]
    pub backend: ChannelLayerBackend,

    /// Messages buffered per connection inbox
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,

    /// Key prefix for Redis keys and channels
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub redis: RedisConfig,
}

impl ChannelLayerConfig {
    /// Validate channel layer configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.inbox_capacity == 0 {
            return Err(ValidationError::InvalidInboxCapacity);
        }
        if self.backend == ChannelLayerBackend::Redis {
            if self.prefix.is_empty() {
                return Err(ValidationError::MissingRequired("CHANNEL_LAYER__PREFIX"));
            }
            self.redis.validate()?;
        }
        Ok(())
    }
}

impl Default for ChannelLayerConfig {
    fn default() -> Self {
        Self {
            backend: ChannelLayerBackend::default(),
            inbox_capacity: default_inbox_capacity(),
            prefix: default_prefix(),
            redis: RedisConfig::default(),
        }
    }
}

fn default_inbox_capacity() -> usize {
    DEFAULT_INBOX_CAPACITY
}

fn default_prefix() -> String {
    "switchboard".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layer_defaults() {
        let config = ChannelLayerConfig::default();
        assert_eq!(config.backend, ChannelLayerBackend::Memory);
        assert_eq!(config.inbox_capacity, DEFAULT_INBOX_CAPACITY);
        assert_eq!(config.prefix, "switchboard");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_capacity() {
        let config = ChannelLayerConfig {
            inbox_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidInboxCapacity));
    }

    #[test]
    fn test_redis_backend_validates_redis_section() {
        let mut config = ChannelLayerConfig {
            backend: ChannelLayerBackend::Redis,
            ..Default::default()
        };
        config.redis.url = "http://nope".to_string();
        assert_eq!(config.validate(), Err(ValidationError::InvalidRedisUrl));
    }

    #[test]
    fn test_memory_backend_ignores_redis_section() {
        let mut config = ChannelLayerConfig::default();
        config.redis.url = "http://nope".to_string();
        assert!(config.validate().is_ok());
    }
}
