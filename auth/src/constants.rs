//! Credential lifecycle constants.
//!
//! Defaults used by the configuration types in [`crate::config`].

use std::time::Duration;

/// Access tokens expiring sooner than this are refreshed before being handed out.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Extra time a record stays in Redis past its access token's expiry.
///
/// The refresh token outlives the access token, so the record must too.
pub const DURABLE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Smallest TTL ever written to Redis.
pub const MIN_DURABLE_TTL: Duration = Duration::from_secs(60);

/// Longest access token lifetime accepted from the token endpoint.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// How long an anti-forgery state value stays acceptable after issuance.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Bytes of randomness in an anti-forgery state value.
pub const STATE_BYTES: usize = 32;

/// Durable-tier probe interval.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive probe failures that open the breaker.
pub const PROBE_FAILURE_THRESHOLD: usize = 3;

/// Time the breaker stays open before a trial probe.
pub const PROBE_COOLDOWN: Duration = Duration::from_secs(30);

/// Cache-to-durable reconciliation interval.
pub const RECONCILIATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Deadline for any upstream authorization-server call.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Key prefix for records in Redis.
pub const DEFAULT_KEY_PREFIX: &str = "ledgerlink";

/// Redis URL used when none is configured.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Upstream endpoints and scopes used when none are configured.
pub mod endpoints {
    /// Authorization (consent) endpoint.
    pub const AUTHORIZATION: &str = "https://appcenter.intuit.com/connect/oauth2";

    /// Token endpoint.
    pub const TOKEN: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

    /// Revocation endpoint.
    pub const REVOCATION: &str = "https://developer.api.intuit.com/v2/oauth2/tokens/revoke";

    /// Default scope.
    pub const SCOPE: &str = "com.intuit.quickbooks.accounting";
}
