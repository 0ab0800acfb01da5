//! Pre-shared token authenticator.
//!
//! Tokens are configured up front and compared in constant time against the
//! bearer token presented by the connection (`Authorization: Bearer ...` or
//! the `token` query parameter).
//!
//! # Example
//!
//! ```ignore
//! let auth = StaticTokenAuthenticator::new()
//!     .with_token("s3cret", Principal::user("svc-reporting"));
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::domain::foundation::{AuthError, Principal};
use crate::ports::{Authenticator, ConnectionMetadata};

struct TokenEntry {
    token: SecretString,
    principal: Principal,
}

/// Maps pre-shared tokens to principals.
#[derive(Default)]
pub struct StaticTokenAuthenticator {
    tokens: Vec<TokenEntry>,
    allow_anonymous: bool,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as `principal`.
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.push(TokenEntry {
            token: SecretString::new(token.into()),
            principal,
        });
        self
    }

    /// Lets connections without any token in as anonymous. Wrong tokens are
    /// still rejected.
    pub fn allow_anonymous(mut self) -> Self {
        self.allow_anonymous = true;
        self
    }

    fn lookup(&self, presented: &str) -> Option<&Principal> {
        // Compare against every entry so timing does not reveal which matched.
        let mut found = None;
        for entry in &self.tokens {
            let matches: bool = entry
                .token
                .expose_secret()
                .as_bytes()
                .ct_eq(presented.as_bytes())
                .into();
            if matches && found.is_none() {
                found = Some(&entry.principal);
            }
        }
        found
    }
}

impl std::fmt::Debug for StaticTokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuthenticator")
            .field("tokens", &self.tokens.len())
            .field("allow_anonymous", &self.allow_anonymous)
            .finish()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, metadata: &ConnectionMetadata) -> Result<Principal, AuthError> {
        match metadata.bearer_token() {
            Some(token) => self.lookup(token).cloned().ok_or(AuthError::InvalidCredentials),
            None if self.allow_anonymous => Ok(Principal::anonymous()),
            None => Err(AuthError::MissingCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> StaticTokenAuthenticator {
        StaticTokenAuthenticator::new()
            .with_token("alpha", Principal::user("alice"))
            .with_token("beta", Principal::user("bob"))
    }

    #[tokio::test]
    async fn known_token_resolves_principal() {
        let meta = ConnectionMetadata::new("/ws").with_header("Authorization", "Bearer beta");
        let principal = authenticator().authenticate(&meta).await.unwrap();
        assert_eq!(principal.user_id.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn query_token_is_accepted() {
        let meta = ConnectionMetadata::new("/ws").with_query("token", "alpha");
        let principal = authenticator().authenticate(&meta).await.unwrap();
        assert_eq!(principal.user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let meta = ConnectionMetadata::new("/ws").with_query("token", "alph");
        let result = authenticator().authenticate(&meta).await;
        assert_eq!(result, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn missing_token_is_rejected_unless_anonymous_allowed() {
        let meta = ConnectionMetadata::new("/ws");
        assert_eq!(
            authenticator().authenticate(&meta).await,
            Err(AuthError::MissingCredentials)
        );

        let principal = authenticator()
            .allow_anonymous()
            .authenticate(&meta)
            .await
            .unwrap();
        assert!(!principal.is_authenticated());
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", authenticator());
        assert!(!rendered.contains("alpha"));
    }
}
