//! Mock authorization server.

use crate::error::{CredentialError, Result};
use crate::providers::AuthorizationServer;
use crate::state::TokenGrant;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Build a token grant.
#[must_use]
pub fn grant(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        token_type: "bearer".to_string(),
        expires_in,
    }
}

/// Authorization server with scripted responses.
///
/// Queued responses are returned in order. Once a queue is empty, exchanges
/// return `access-{n}` / `refresh-{n}` grants and refreshes return
/// `refreshed-{n}` grants without a new refresh token, all valid for an hour.
#[derive(Debug, Clone, Default)]
pub struct MockAuthorizationServer {
    exchanges: Arc<Mutex<VecDeque<Result<TokenGrant>>>>,
    refreshes: Arc<Mutex<VecDeque<Result<TokenGrant>>>>,
    failing_revocations: Arc<Mutex<HashSet<String>>>,
    revoked: Arc<Mutex<Vec<String>>>,
    refresh_tokens_seen: Arc<Mutex<Vec<String>>>,
    exchange_calls: Arc<AtomicUsize>,
    refresh_calls: Arc<AtomicUsize>,
    refresh_delay: Option<Duration>,
}

impl MockAuthorizationServer {
    /// Create a server that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every refresh.
    #[must_use]
    pub const fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    /// Queue the response for the next code exchange.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn push_exchange(&self, response: Result<TokenGrant>) {
        self.exchanges.lock().unwrap().push_back(response);
    }

    /// Queue the response for the next refresh.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn push_refresh(&self, response: Result<TokenGrant>) {
        self.refreshes.lock().unwrap().push_back(response);
    }

    /// Make revocation of `token` fail.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn fail_revocation_of(&self, token: &str) {
        self.failing_revocations
            .lock()
            .unwrap()
            .insert(token.to_string());
    }

    /// Tokens successfully revoked, in order.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }

    /// Refresh tokens presented to [`refresh`](AuthorizationServer::refresh), in order.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().unwrap().clone()
    }

    /// Number of code exchanges.
    #[must_use]
    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    /// Number of refreshes.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl AuthorizationServer for MockAuthorizationServer {
    fn authorization_url(&self, state: &str) -> Result<String> {
        Ok(format!(
            "https://auth.mock/authorize?client_id=mock&response_type=code&state={state}"
        ))
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant> {
        let n = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.exchanges.lock().unwrap().pop_front();

        scripted.unwrap_or_else(|| {
            Ok(grant(
                &format!("access-{n}"),
                Some(&format!("refresh-{n}")),
                3600,
            ))
        })
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.refreshes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(grant(&format!("refreshed-{n}"), None, 3600)))
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn revoke(&self, token: &str) -> Result<()> {
        if self.failing_revocations.lock().unwrap().contains(token) {
            return Err(CredentialError::upstream(
                "revocation_failed",
                format!("scripted revocation failure for {token}"),
            ));
        }

        self.revoked.lock().unwrap().push(token.to_string());
        Ok(())
    }
}
