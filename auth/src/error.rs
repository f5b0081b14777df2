//! Error types for credential storage and the OAuth lifecycle.

use thiserror::Error;

/// Result type alias for credential operations.
pub type Result<T> = std::result::Result<T, CredentialError>;

/// Error taxonomy for the credential store and service.
///
/// `Unavailable` never escapes the resilient store: it is logged there and
/// turned into a cache fallback (or `NotFound` when the cache is empty too).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    // ═══════════════════════════════════════════════════════════
    // Storage Errors
    // ═══════════════════════════════════════════════════════════

    /// No credential record exists for the user.
    #[error("No credentials found for user")]
    NotFound,

    /// The durable tier could not be reached or returned unusable data.
    #[error("Durable credential store unavailable: {0}")]
    Unavailable(String),

    /// A record could not be encoded for storage.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ═══════════════════════════════════════════════════════════
    // Upstream Errors
    // ═══════════════════════════════════════════════════════════

    /// The authorization server rejected a grant or revocation, or could not
    /// be reached.
    #[error("Upstream authorization error ({code}): {message}")]
    UpstreamError {
        /// Upstream error code (e.g. `invalid_grant`), or a local code such
        /// as `timeout` for transport failures
        code: String,
        /// Human-readable description
        message: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Input / Setup Errors
    // ═══════════════════════════════════════════════════════════

    /// An empty tenant identifier was supplied for binding.
    #[error("Tenant identifier must not be empty")]
    InvalidTenant,

    /// Required configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl CredentialError {
    /// Build an `UpstreamError` from a code and message.
    #[must_use]
    pub fn upstream(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamError {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the user must re-authorize (no record, or the
    /// upstream rejected the grant as invalid).
    ///
    /// # Examples
    ///
    /// ```
    /// # use ledgerlink_auth::CredentialError;
    /// assert!(CredentialError::NotFound.requires_reauthorization());
    /// assert!(CredentialError::upstream("invalid_grant", "expired").requires_reauthorization());
    /// assert!(!CredentialError::upstream("timeout", "slow").requires_reauthorization());
    /// ```
    #[must_use]
    pub fn requires_reauthorization(&self) -> bool {
        match self {
            Self::NotFound => true,
            Self::UpstreamError { code, .. } => code == "invalid_grant",
            _ => false,
        }
    }

    /// Returns `true` for durable-tier failures that the resilient store
    /// recovers from transparently.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
