//! Authenticator that accepts every connection.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Principal};
use crate::ports::{Authenticator, ConnectionMetadata};

/// Accepts every connection as [`Principal::anonymous`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnonymous;

#[async_trait]
impl Authenticator for AllowAnonymous {
    async fn authenticate(&self, _metadata: &ConnectionMetadata) -> Result<Principal, AuthError> {
        Ok(Principal::anonymous())
    }
}
