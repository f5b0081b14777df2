//! HTTP authorization server client.

use crate::config::AuthorizationServerConfig;
use crate::error::{CredentialError, Result};
use crate::providers::AuthorizationServer;
use crate::state::TokenGrant;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::Deserialize;

/// `OAuth` authorization server reached over HTTPS.
///
/// Token and revocation requests are form POSTs authenticated with the
/// client credentials via HTTP basic auth. Every request carries the
/// configured deadline (10 seconds by default).
///
/// # Example
///
/// ```no_run
/// use ledgerlink_auth::config::AuthorizationServerConfig;
/// use ledgerlink_auth::providers::HttpAuthorizationServer;
///
/// # fn example() -> ledgerlink_auth::Result<()> {
/// let config = AuthorizationServerConfig::new(
///     "client-id",
///     "client-secret",
///     "https://app.example.com/auth/callback",
/// );
/// let server = HttpAuthorizationServer::new(config)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpAuthorizationServer {
    config: AuthorizationServerConfig,
    http_client: Client,
}

/// Error body returned by the token and revocation endpoints.
#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

impl HttpAuthorizationServer {
    /// Create a client for the configured authorization server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the HTTP client cannot be built.
    pub fn new(config: AuthorizationServerConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                CredentialError::ConfigurationError(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Configuration this client was built from.
    #[must_use]
    pub const fn config(&self) -> &AuthorizationServerConfig {
        &self.config
    }

    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<String> {
        let response = self
            .http_client
            .post(url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(ACCEPT, "application/json")
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        response.text().await.map_err(transport_error)
    }

    async fn token_request(&self, grant_type: &'static str, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let mut form = Vec::with_capacity(params.len() + 1);
        form.push(("grant_type", grant_type));
        form.extend_from_slice(params);

        let body = self.post_form(&self.config.token_endpoint, &form).await?;

        let grant: TokenGrant = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(grant_type, error = %e, "Unparseable token response");
            CredentialError::upstream("invalid_response", format!("Failed to parse token response: {e}"))
        })?;

        if !grant.has_plausible_lifetime() {
            tracing::warn!(grant_type, expires_in = grant.expires_in, "Token response lifetime out of range");
            return Err(CredentialError::upstream(
                "invalid_response",
                format!("Token lifetime out of range: {}", grant.expires_in),
            ));
        }
        Ok(grant)
    }
}

fn transport_error(e: reqwest::Error) -> CredentialError {
    if e.is_timeout() {
        CredentialError::upstream("timeout", format!("Authorization server timed out: {e}"))
    } else {
        CredentialError::upstream("request_failed", format!("Authorization server request failed: {e}"))
    }
}

/// Map a non-success response to `UpstreamError`, preferring the
/// `error` / `error_description` fields when the body carries them.
async fn rejection(response: Response) -> CredentialError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let parsed = serde_json::from_str::<UpstreamErrorBody>(&body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.error.clone())
        .unwrap_or_else(|| format!("http_{}", status.as_u16()));
    let message = parsed
        .and_then(|b| b.error_description)
        .filter(|description| !description.is_empty())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body
            }
        });

    tracing::warn!(status = status.as_u16(), code = %code, "Authorization server rejected request");
    CredentialError::UpstreamError { code, message }
}

impl AuthorizationServer for HttpAuthorizationServer {
    fn authorization_url(&self, state: &str) -> Result<String> {
        let scope = self.config.scopes.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("state", state),
        ];

        let query = serde_urlencoded::to_string(params).map_err(|e| {
            CredentialError::ConfigurationError(format!("Failed to build authorization URL: {e}"))
        })?;

        let base = &self.config.authorization_endpoint;
        let separator = if base.contains('?') { '&' } else { '?' };
        Ok(format!("{base}{separator}{query}"))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        tracing::debug!("Exchanging authorization code");
        self.token_request(
            "authorization_code",
            &[("code", code), ("redirect_uri", &self.config.redirect_uri)],
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        tracing::debug!("Refreshing access token");
        self.token_request("refresh_token", &[("refresh_token", refresh_token)])
            .await
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        tracing::debug!("Revoking token");
        self.post_form(&self.config.revocation_endpoint, &[("token", token)])
            .await
            .map(|_| ())
    }
}
