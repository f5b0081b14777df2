//! Upstream authorization server trait.

use crate::error::Result;
use crate::state::TokenGrant;

/// `OAuth` authorization server for the remote accounting API.
///
/// # Errors
///
/// All operations map upstream rejections and transport failures to
/// [`UpstreamError`](crate::CredentialError::UpstreamError). No call is
/// retried; every call carries its own deadline.
pub trait AuthorizationServer: Send + Sync {
    /// Build the consent URL the user is redirected to.
    ///
    /// Deterministic for a given `state`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the URL cannot be encoded.
    fn authorization_url(&self, state: &str) -> Result<String>;

    /// Exchange an authorization code for a token grant.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` if the grant is rejected.
    fn exchange_code(&self, code: &str)
    -> impl std::future::Future<Output = Result<TokenGrant>> + Send;

    /// Mint a new access token from a refresh token.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` if the grant is rejected (`invalid_grant`
    /// means the user must re-authorize).
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl std::future::Future<Output = Result<TokenGrant>> + Send;

    /// Revoke a single access or refresh token.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` if revocation fails.
    fn revoke(&self, token: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}
