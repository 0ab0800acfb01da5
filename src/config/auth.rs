//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// One pre-shared token and the user it authenticates
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub token: SecretString,
    pub user_id: String,
}

/// Authentication configuration (pre-shared tokens)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Accept connections that present no token
    #[serde(default = "default_allow_anonymous")]
    pub allow_anonymous: bool,

    /// Comma-separated `token:user_id` pairs
    pub tokens: Option<SecretString>,
}

impl AuthConfig {
    /// Parse the configured token grants
    pub fn token_grants(&self) -> Result<Vec<TokenGrant>, ValidationError> {
        let Some(tokens) = &self.tokens else {
            return Ok(Vec::new());
        };
        tokens
            .expose_secret()
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .enumerate()
            .map(|(index, pair)| match pair.split_once(':') {
                Some((token, user)) if !token.trim().is_empty() && !user.trim().is_empty() => {
                    Ok(TokenGrant {
                        token: SecretString::new(token.trim().to_string()),
                        user_id: user.trim().to_string(),
                    })
                }
                _ => Err(ValidationError::InvalidTokenGrant(index + 1)),
            })
            .collect()
    }

    /// Validate authentication configuration
    ///
    /// Production deployments must configure at least one token.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let grants = self.token_grants()?;
        if *environment == Environment::Production && self.allow_anonymous && grants.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__TOKENS"));
        }
        if !self.allow_anonymous && grants.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__TOKENS"));
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: default_allow_anonymous(),
            tokens: None,
        }
    }
}

fn default_allow_anonymous() -> bool {
    true
}
