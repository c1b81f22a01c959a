//! `OAuth2` token provider used by XOAUTH2 and OAUTHBEARER authentication.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::Result;

/// Time a token provider is given to produce a token.
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Boxed future returned by [`OAuth2TokenProvider::get_token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Supplies access tokens for `OAuth2` SASL mechanisms.
///
/// Implementations usually cache tokens and refresh them on demand. The
/// connection calls [`invalidate_token`](Self::invalidate_token) when the
/// server rejects a token, then asks for a new one.
pub trait OAuth2TokenProvider: Send + Sync {
    /// Returns an access token for `username`, waiting at most `timeout`.
    fn get_token<'a>(&'a self, username: &'a str, timeout: Duration) -> TokenFuture<'a>;

    /// Drops the cached token for `username`.
    fn invalidate_token(&self, username: &str);
}
