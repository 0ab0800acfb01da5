//! Authenticator port - Resolves the principal of a new connection.
//!
//! # Example
//!
//! ```ignore
//! let principal = authenticator.authenticate(&metadata).await?;
//! tracing::info!(principal = %principal.label(), "connection authenticated");
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Principal};

use super::transport::ConnectionMetadata;

/// Decides who is on the other end of a connection.
///
/// # Contract
///
/// Implementations must:
/// - Return `Ok(Principal::anonymous())` when anonymous access is allowed
/// - Return `AuthError::MissingCredentials` or `InvalidCredentials` to reject
/// - Return `AuthError::ServiceUnavailable` for transient backend failures
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, metadata: &ConnectionMetadata) -> Result<Principal, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HeaderAuthenticator;

    #[async_trait]
    impl Authenticator for HeaderAuthenticator {
        async fn authenticate(
            &self,
            metadata: &ConnectionMetadata,
        ) -> Result<Principal, AuthError> {
            metadata
                .header("x-user")
                .map(Principal::user)
                .ok_or(AuthError::MissingCredentials)
        }
    }

    #[tokio::test]
    async fn authenticator_resolves_principal() {
        let meta = ConnectionMetadata::new("/ws").with_header("x-user", "alice");
        let principal = HeaderAuthenticator.authenticate(&meta).await.unwrap();
        assert_eq!(principal.user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn authenticator_rejects_missing_credentials() {
        let meta = ConnectionMetadata::new("/ws");
        let result = HeaderAuthenticator.authenticate(&meta).await;
        assert_eq!(result, Err(AuthError::MissingCredentials));
    }

    #[test]
    fn authenticator_trait_is_object_safe_and_send_sync() {
        fn _assert_trait_object(_: &dyn Authenticator) {}
        fn _assert_arc_send_sync<T: Send + Sync + ?Sized>() {}
        _assert_arc_send_sync::<std::sync::Arc<dyn Authenticator>>();
    }
}
