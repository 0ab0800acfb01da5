//! Wire protocol configuration

use serde::Deserialize;
use std::collections::BTreeSet;

use crate::application::{DispatcherConfig, FlushMode};
use crate::domain::protocol::{DiscriminatorNamespaces, DEFAULT_DISCRIMINATOR_FIELD, PAYLOAD_FIELD};

use super::error::ValidationError;

/// Protocol behavior shared by all consumers
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Envelope key holding the discriminator
    #[serde(default = "default_discriminator_field")]
    pub discriminator_field: String,

    /// Emit a completion sentinel after each processing cycle
    #[serde(default)]
    pub send_completion: bool,

    /// Emit an `authentication` status frame when a connection is accepted or refused
    #[serde(default)]
    pub send_authentication_message: bool,

    /// Outbound flush policy
    #[serde(default)]
    pub flush: FlushMode,

    /// Discriminator namespace policy for incoming and event kinds
    #[serde(default)]
    pub namespaces: DiscriminatorNamespaces,

    /// Log envelopes at debug level
    #[serde(default = "default_log_messages")]
    pub log_messages: bool,

    /// Actions excluded from message logging (comma-separated)
    pub ignored_log_actions: Option<String>,

    /// Inbound frames buffered per connection
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,

    /// Outbound frames queued per connection before handlers and deliveries wait
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl ProtocolConfig {
    /// Get ignored actions as a set
    pub fn ignored_log_actions_set(&self) -> BTreeSet<String> {
        self.ignored_log_actions
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Settings handed to every connection dispatcher
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            discriminator_field: self.discriminator_field.clone(),
            send_completion: self.send_completion,
            send_authentication_message: self.send_authentication_message,
            flush: self.flush,
            log_messages: self.log_messages,
            ignored_log_actions: self.ignored_log_actions_set(),
            inbound_buffer: self.inbound_buffer,
            outbound_buffer: self.outbound_buffer,
        }
    }

    /// Validate protocol configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let field = self.discriminator_field.trim();
        if field.is_empty() || field == PAYLOAD_FIELD {
            return Err(ValidationError::InvalidDiscriminatorField);
        }
        if self.inbound_buffer == 0 {
            return Err(ValidationError::InvalidInboundBuffer);
        }
        if self.outbound_buffer == 0 {
            return Err(ValidationError::InvalidOutboundBuffer);
        }
        Ok(())
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            discriminator_field: default_discriminator_field(),
            send_completion: false,
            send_authentication_message: false,
            flush: FlushMode::default(),
            namespaces: DiscriminatorNamespaces::default(),
            log_messages: default_log_messages(),
            ignored_log_actions: None,
            inbound_buffer: default_inbound_buffer(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_discriminator_field() -> String {
    DEFAULT_DISCRIMINATOR_FIELD.to_string()
}

fn default_log_messages() -> bool {
    true
}

fn default_inbound_buffer() -> usize {
    64
}

fn default_outbound_buffer() -> usize {
    64
}
