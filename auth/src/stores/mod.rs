//! Storage implementations for credentials.
//!
//! - **Redis credential store** - durable tier, optionally encrypted at rest
//! - **Resilient credential store** - in-process cache in front of the durable
//!   tier, with health-gated fallback and background reconciliation
//! - **Credential backend** - the variant chosen from [`StoreConfig`] at startup

pub mod credential_redis;
pub mod resilient;

// Re-exports
pub use credential_redis::RedisCredentialStore;
pub use resilient::{ReconciliationReport, ResilientCredentialStore};

use crate::config::{HealthConfig, ReconciliationConfig, StoreConfig};
use crate::error::Result;
use crate::health::HealthMonitor;
use crate::providers::CredentialStore;
use crate::state::{CredentialRecord, UserId};
use ledgerlink_runtime::PeriodicTask;

/// Resilient store over Redis, gated by a Redis health monitor.
pub type ResilientRedisStore =
    ResilientCredentialStore<RedisCredentialStore, HealthMonitor<RedisCredentialStore>>;

/// Credential store selected once at construction.
#[derive(Debug, Clone)]
pub enum CredentialBackend {
    /// Redis only; durable failures reach the caller.
    Durable(RedisCredentialStore),

    /// Redis behind the in-process cache.
    Resilient(ResilientRedisStore),
}

impl CredentialBackend {
    /// Build the backend described by `config`.
    ///
    /// No connection is attempted; Redis is contacted on first use.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the Redis URL or encryption key is invalid.
    pub fn from_config(config: &StoreConfig, health: HealthConfig) -> Result<Self> {
        let mut redis = RedisCredentialStore::new(&config.redis_url, config.key_prefix.clone())?;
        if let Some(key) = &config.encryption_key {
            redis = redis.with_encryption_key(key)?;
        }

        if !config.fallback_enabled {
            tracing::info!("Using Redis credential store without cache fallback");
            return Ok(Self::Durable(redis));
        }

        tracing::info!("Using resilient credential store with cache fallback");
        let monitor = HealthMonitor::new(redis.clone(), health);
        Ok(Self::Resilient(ResilientCredentialStore::new(redis, monitor)))
    }

    /// Start the background tasks this backend needs.
    ///
    /// The durable backend needs none; the resilient backend starts health
    /// probing (first probe immediately) and reconciliation.
    #[must_use]
    pub fn start_background_tasks(&self, reconciliation: &ReconciliationConfig) -> Vec<PeriodicTask> {
        match self {
            Self::Durable(_) => Vec::new(),
            Self::Resilient(store) => vec![
                store.health().start(),
                store.start_reconciliation(reconciliation.interval),
            ],
        }
    }
}

impl CredentialStore for CredentialBackend {
    async fn save(&self, user_id: &UserId, record: &CredentialRecord) -> Result<()> {
        match self {
            Self::Durable(store) => store.save(user_id, record).await,
            Self::Resilient(store) => store.save(user_id, record).await,
        }
    }

    async fn get(&self, user_id: &UserId) -> Result<CredentialRecord> {
        match self {
            Self::Durable(store) => store.get(user_id).await,
            Self::Resilient(store) => store.get(user_id).await,
        }
    }

    async fn delete(&self, user_id: &UserId) -> Result<()> {
        match self {
            Self::Durable(store) => store.delete(user_id).await,
            Self::Resilient(store) => store.delete(user_id).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backend_variant_follows_fallback_flag() {
        let resilient = CredentialBackend::from_config(&StoreConfig::default(), HealthConfig::default()).unwrap();
        assert!(matches!(resilient, CredentialBackend::Resilient(_)));

        let durable = CredentialBackend::from_config(
            &StoreConfig::default().with_fallback(false),
            HealthConfig::default(),
        )
        .unwrap();
        assert!(matches!(durable, CredentialBackend::Durable(_)));
        assert!(durable.start_background_tasks(&ReconciliationConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn test_resilient_backend_serves_cache_before_first_probe() {
        let backend = CredentialBackend::from_config(
            &StoreConfig::new("redis://127.0.0.1:1"),
            HealthConfig::default(),
        )
        .unwrap();
        let user = UserId::from("u1");
        let record = CredentialRecord {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "bearer".to_string(),
            expires_at: chrono::Utc::now(),
            tenant_id: String::new(),
        };

        backend.save(&user, &record).await.unwrap();
        assert_eq!(backend.get(&user).await.unwrap(), record);
    }
}
