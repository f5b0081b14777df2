//! Credential state types.
//!
//! This module defines the data passed between the stores and the
//! credential service. All types are `Clone` so records can be handed out
//! from the in-process cache without holding its lock.

use crate::constants::MAX_TOKEN_LIFETIME;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Identifier of the local user owning a credential record.
///
/// Opaque to this crate; it is whatever the surrounding application uses
/// to identify its users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Create a `UserId` from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Credential Record
// ═══════════════════════════════════════════════════════════════════════

/// Delegated-access credentials for one user.
///
/// `expires_at` is always computed locally from the grant's `expires_in`
/// at the moment the grant was received; it is never copied from the wire.
///
/// `tenant_id` identifies the external accounting company the token
/// authorizes. It is empty only between the authorization-code exchange and
/// the callback that binds the tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Bearer credential for the remote API.
    pub access_token: String,

    /// Token used to mint a new access token without re-authorization.
    pub refresh_token: String,

    /// Auth scheme label (e.g. `bearer`).
    pub token_type: String,

    /// Absolute expiry of `access_token`.
    pub expires_at: DateTime<Utc>,

    /// External account identifier; empty until bound.
    #[serde(default)]
    pub tenant_id: String,
}

impl CredentialRecord {
    /// Build an unbound record from a token grant received at `issued_at`.
    #[must_use]
    pub fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        let expires_at = grant.expires_at(issued_at);
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or_default(),
            token_type: grant.token_type,
            expires_at,
            tenant_id: String::new(),
        }
    }

    /// Apply a refresh grant received at `issued_at`.
    ///
    /// The tenant id is always preserved. The refresh token is replaced only
    /// when the grant carries a non-empty one; rotation is optional upstream.
    #[must_use]
    pub fn refreshed(&self, grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        let expires_at = grant.expires_at(issued_at);
        let refresh_token = grant
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| self.refresh_token.clone());

        Self {
            access_token: grant.access_token,
            refresh_token,
            token_type: grant.token_type,
            expires_at,
            tenant_id: self.tenant_id.clone(),
        }
    }

    /// Whether the tenant id has been bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        !self.tenant_id.is_empty()
    }

    /// Time left before the access token expires (negative once expired).
    #[must_use]
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at.signed_duration_since(now)
    }

    /// Whether the access token expires in less than `margin` from `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.time_to_expiry(now) < margin
    }
}

// Tokens stay out of logs.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Upstream Types
// ═══════════════════════════════════════════════════════════════════════

/// Token endpoint response for both grant types.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    /// New access token.
    pub access_token: String,

    /// New refresh token, when the server rotated it.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Auth scheme label.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenGrant {
    /// Whether `expires_in` is within `0..=MAX_TOKEN_LIFETIME`.
    #[must_use]
    pub fn has_plausible_lifetime(&self) -> bool {
        u64::try_from(self.expires_in).is_ok_and(|secs| secs <= MAX_TOKEN_LIFETIME.as_secs())
    }

    /// Absolute expiry of this grant when received at `issued_at`.
    ///
    /// `expires_in` is clamped to `0..=MAX_TOKEN_LIFETIME`.
    #[must_use]
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        let max = i64::try_from(MAX_TOKEN_LIFETIME.as_secs()).unwrap_or(i64::MAX);
        let lifetime = Duration::try_seconds(self.expires_in.clamp(0, max)).unwrap_or_default();
        issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Connection summary for a user, as shown by a status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Whether a credential record exists.
    pub connected: bool,

    /// Bound tenant, if connected and bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Access token expiry, if connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    /// Status for a user without credentials.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            connected: false,
            tenant_id: None,
            expires_at: None,
        }
    }

    /// Status derived from a stored record.
    #[must_use]
    pub fn from_record(record: &CredentialRecord) -> Self {
        Self {
            connected: true,
            tenant_id: record.is_bound().then(|| record.tenant_id.clone()),
            expires_at: Some(record.expires_at),
        }
    }
}
