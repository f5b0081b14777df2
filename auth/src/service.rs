//! OAuth credential lifecycle.
//!
//! [`CredentialService`] drives the authorization-code and refresh-token
//! grants against the upstream authorization server and keeps the resulting
//! records in a [`CredentialStore`]. It is the only component that changes
//! record contents.
//!
//! # Refresh single-flight
//!
//! Refreshes for one user are serialized by a per-user async mutex. A caller
//! of [`get_valid_token`](CredentialService::get_valid_token) that finds the
//! token inside the refresh margin takes the user's lock, then re-reads the
//! record: if a concurrent caller already refreshed it, that result is
//! reused and no second refresh is sent. Rotating refresh tokens are only
//! ever presented once.

use crate::config::CredentialConfig;
use crate::environment::{Clock, CredentialEnvironment, SystemClock};
use crate::error::{CredentialError, Result};
use crate::providers::{AuthorizationServer, CredentialStore};
use crate::state::{ConnectionStatus, CredentialRecord, UserId};
use ledgerlink_runtime::metrics::RefreshMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type UserLocks = Mutex<HashMap<UserId, Arc<Mutex<()>>>>;

/// Credential lifecycle service.
///
/// # Type Parameters
///
/// - `S`: Credential store
/// - `A`: Upstream authorization server
/// - `C`: Clock
///
/// # Example
///
/// ```
/// use ledgerlink_auth::config::CredentialConfig;
/// use ledgerlink_auth::environment::CredentialEnvironment;
/// use ledgerlink_auth::mocks::{InMemoryCredentialStore, MockAuthorizationServer};
/// use ledgerlink_auth::{CredentialService, UserId};
///
/// # async fn example() -> ledgerlink_auth::Result<()> {
/// let env = CredentialEnvironment::new(
///     InMemoryCredentialStore::new(),
///     MockAuthorizationServer::new(),
/// );
/// let service = CredentialService::new(env, CredentialConfig::default());
///
/// let user = UserId::from("u1");
/// service.complete_authorization("code", &user, Some("9991")).await?;
///
/// let record = service.get_valid_token(&user).await?;
/// assert_eq!(record.tenant_id, "9991");
/// # Ok(())
/// # }
/// ```
pub struct CredentialService<S, A, C = SystemClock>
where
    S: CredentialStore,
    A: AuthorizationServer,
    C: Clock,
{
    env: CredentialEnvironment<S, A, C>,
    refresh_margin: chrono::Duration,
    user_locks: UserLocks,
}

impl<S, A, C> CredentialService<S, A, C>
where
    S: CredentialStore,
    A: AuthorizationServer,
    C: Clock,
{
    /// Create a service over `env`.
    #[must_use]
    pub fn new(env: CredentialEnvironment<S, A, C>, config: CredentialConfig) -> Self {
        Self {
            env,
            refresh_margin: chrono::Duration::from_std(config.refresh_margin)
                .unwrap_or(chrono::Duration::MAX),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The credential store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.env.store
    }

    /// The upstream authorization server.
    #[must_use]
    pub const fn authorization(&self) -> &A {
        &self.env.authorization
    }

    // ═══════════════════════════════════════════════════════════════════
    // Authorization
    // ═══════════════════════════════════════════════════════════════════

    /// Build the consent URL for a caller-supplied anti-forgery `state`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the URL cannot be encoded.
    pub fn build_authorization_url(&self, state: &str) -> Result<String> {
        self.env.authorization.authorization_url(state)
    }

    /// Exchange an authorization code and store the resulting credentials.
    ///
    /// The stored record is unbound until [`bind_tenant`](Self::bind_tenant)
    /// runs. Any existing record for the user is replaced.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` if the grant is rejected, or the store's error
    /// if the record cannot be saved.
    pub async fn exchange_code(&self, code: &str, user_id: &UserId) -> Result<CredentialRecord> {
        let grant = self.env.authorization.exchange_code(code).await?;
        let record = CredentialRecord::from_grant(grant, self.env.clock.now());

        self.env.store.save(user_id, &record).await?;

        tracing::info!(
            user_id = %user_id,
            expires_at = %record.expires_at,
            "Exchanged authorization code for credentials"
        );
        Ok(record)
    }

    /// Bind the external tenant the credentials authorize.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTenant` for an empty `tenant_id`, `NotFound` if the
    /// user has no credentials.
    pub async fn bind_tenant(&self, user_id: &UserId, tenant_id: &str) -> Result<CredentialRecord> {
        if tenant_id.is_empty() {
            return Err(CredentialError::InvalidTenant);
        }

        let mut record = self.env.store.get(user_id).await?;
        record.tenant_id = tenant_id.to_string();
        self.env.store.save(user_id, &record).await?;

        tracing::info!(user_id = %user_id, tenant_id, "Bound tenant to credentials");
        Ok(record)
    }

    /// Handle the authorization callback: exchange `code`, then bind
    /// `tenant_id` when the callback carried one.
    ///
    /// An absent or empty tenant leaves the record as exchanged.
    ///
    /// # Errors
    ///
    /// Returns any error from [`exchange_code`](Self::exchange_code) or
    /// [`bind_tenant`](Self::bind_tenant).
    pub async fn complete_authorization(
        &self,
        code: &str,
        user_id: &UserId,
        tenant_id: Option<&str>,
    ) -> Result<CredentialRecord> {
        let record = self.exchange_code(code, user_id).await?;

        match tenant_id.filter(|tenant| !tenant.is_empty()) {
            Some(tenant) => self.bind_tenant(user_id, tenant).await,
            None => {
                tracing::warn!(user_id = %user_id, "Authorization callback carried no tenant id");
                Ok(record)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Token Lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Refresh the user's access token unconditionally.
    ///
    /// The tenant id is preserved; the refresh token is replaced only if the
    /// upstream rotated it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user has no credentials, `UpstreamError` if
    /// the refresh is rejected.
    pub async fn refresh(&self, user_id: &UserId) -> Result<CredentialRecord> {
        let lock = self.user_lock(user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_current(user_id).await
        };
        self.release_user_lock(user_id, lock).await;
        result
    }

    /// Load the user's credentials, refreshing them first when the access
    /// token expires within the refresh margin.
    ///
    /// A record found inside the margin is never returned unrefreshed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user has no credentials, `UpstreamError` if a
    /// needed refresh is rejected.
    pub async fn get_valid_token(&self, user_id: &UserId) -> Result<CredentialRecord> {
        let record = self.env.store.get(user_id).await?;
        if !record.needs_refresh(self.env.clock.now(), self.refresh_margin) {
            return Ok(record);
        }

        let lock = self.user_lock(user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_if_needed(user_id).await
        };
        self.release_user_lock(user_id, lock).await;
        result
    }

    /// Revoke both tokens upstream and delete the user's credentials.
    ///
    /// The access token is revoked first, then the refresh token. If either
    /// revocation fails the record is kept, so retrying re-attempts both.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user has no credentials, `UpstreamError` if
    /// either revocation fails.
    pub async fn disconnect(&self, user_id: &UserId) -> Result<()> {
        let lock = self.user_lock(user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.revoke_and_delete(user_id).await
        };
        self.release_user_lock(user_id, lock).await;
        result
    }

    /// Whether the user is connected, and to which tenant.
    ///
    /// # Errors
    ///
    /// Returns store errors other than `NotFound`.
    pub async fn connection_status(&self, user_id: &UserId) -> Result<ConnectionStatus> {
        match self.env.store.get(user_id).await {
            Ok(record) => Ok(ConnectionStatus::from_record(&record)),
            Err(CredentialError::NotFound) => Ok(ConnectionStatus::disconnected()),
            Err(e) => Err(e),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Internals (caller holds the user's lock)
    // ═══════════════════════════════════════════════════════════════════

    async fn refresh_current(&self, user_id: &UserId) -> Result<CredentialRecord> {
        let record = self.env.store.get(user_id).await?;
        self.refresh_record(user_id, &record).await
    }

    async fn refresh_if_needed(&self, user_id: &UserId) -> Result<CredentialRecord> {
        let record = self.env.store.get(user_id).await?;
        if !record.needs_refresh(self.env.clock.now(), self.refresh_margin) {
            tracing::debug!(user_id = %user_id, "Credentials refreshed by concurrent caller");
            return Ok(record);
        }

        tracing::debug!(
            user_id = %user_id,
            expires_at = %record.expires_at,
            "Access token inside refresh margin"
        );
        self.refresh_record(user_id, &record).await
    }

    async fn refresh_record(
        &self,
        user_id: &UserId,
        record: &CredentialRecord,
    ) -> Result<CredentialRecord> {
        let grant = match self.env.authorization.refresh(&record.refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                RefreshMetrics::record_failure();
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    reauthorize = e.requires_reauthorization(),
                    "Token refresh rejected"
                );
                return Err(e);
            }
        };

        let refreshed = record.refreshed(grant, self.env.clock.now());
        self.env.store.save(user_id, &refreshed).await?;
        RefreshMetrics::record_success();

        tracing::info!(
            user_id = %user_id,
            expires_at = %refreshed.expires_at,
            rotated = refreshed.refresh_token != record.refresh_token,
            "Refreshed access token"
        );
        Ok(refreshed)
    }

    async fn revoke_and_delete(&self, user_id: &UserId) -> Result<()> {
        let record = self.env.store.get(user_id).await?;

        if let Err(e) = self.env.authorization.revoke(&record.access_token).await {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                already_revoked = "none",
                "Access token revocation failed, keeping credentials"
            );
            return Err(e);
        }

        if let Err(e) = self.env.authorization.revoke(&record.refresh_token).await {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                already_revoked = "access_token",
                "Refresh token revocation failed, keeping credentials"
            );
            return Err(e);
        }

        self.env.store.delete(user_id).await?;
        tracing::info!(user_id = %user_id, "Disconnected and deleted credentials");
        Ok(())
    }

    async fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(locks.entry(user_id.clone()).or_default())
    }

    async fn release_user_lock(&self, user_id: &UserId, lock: Arc<Mutex<()>>) {
        let mut locks = self.user_locks.lock().await;
        // Only the map and this handle remain: nobody else is waiting.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(user_id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.user_locks.lock().await.len()
    }
}

impl<S, A, C> std::fmt::Debug for CredentialService<S, A, C>
where
    S: CredentialStore,
    A: AuthorizationServer,
    C: Clock,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService")
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}
