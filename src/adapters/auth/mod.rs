//! Authentication adapters.
//!
//! Implementations of the `Authenticator` port:
//!
//! - `anonymous` - Accepts every connection
//! - `static_token` - Pre-shared bearer tokens

mod anonymous;
mod static_token;

pub use anonymous::AllowAnonymous;
pub use static_token::StaticTokenAuthenticator;
