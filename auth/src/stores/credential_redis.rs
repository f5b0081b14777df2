//! Redis-backed durable credential store.
//!
//! Records are stored as JSON under `{prefix}:token:{user_id}` with a TTL
//! that outlives the access token by a day, so the refresh token stays
//! usable after the access token lapses.
//!
//! # Encryption at rest
//!
//! When given a 32-byte key the store encrypts every payload with
//! AES-256-GCM and stores `nonce (12 bytes) || ciphertext`. Records written
//! with one key cannot be read with another; such reads surface as
//! `Unavailable`, which the resilient store treats like any other durable
//! failure.
//!
//! # Connection
//!
//! The connection is opened lazily on first use, so the process can start
//! while Redis is down. Once open, reconnection is handled by the
//! [`ConnectionManager`].
//!
//! # Example
//!
//! ```no_run
//! use ledgerlink_auth::stores::RedisCredentialStore;
//!
//! # fn example() -> ledgerlink_auth::Result<()> {
//! let store = RedisCredentialStore::new("redis://127.0.0.1:6379", "ledgerlink")?
//!     .with_encryption_key(&[0u8; 32])?; // Replace with a real key!
//! # Ok(())
//! # }
//! ```

use crate::constants::{DURABLE_RETENTION, MIN_DURABLE_TTL};
use crate::error::{CredentialError, Result};
use crate::providers::{CredentialStore, LivenessProbe};
use crate::state::{CredentialRecord, UserId};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use chrono::{DateTime, Utc};
use ledgerlink_runtime::metrics::CredentialStoreMetrics;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const NONCE_LEN: usize = 12;

/// Deadline for a single Redis command, including a lazy connect.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Durable credential store backed by Redis.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct RedisCredentialStore {
    client: Client,
    connection: Arc<Mutex<Option<ConnectionManager>>>,
    key_prefix: String,
    cipher: Option<Arc<Aes256Gcm>>,
}

impl RedisCredentialStore {
    /// Create a store for `redis_url`. No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the URL is malformed.
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            CredentialError::ConfigurationError(format!("Invalid Redis URL: {e}"))
        })?;

        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(None)),
            key_prefix: key_prefix.into(),
            cipher: None,
        })
    }

    /// Encrypt records at rest with an AES-256-GCM key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the key is not exactly 32 bytes.
    pub fn with_encryption_key(mut self, key: &[u8]) -> Result<Self> {
        if key.len() != 32 {
            return Err(CredentialError::ConfigurationError(
                "Encryption key must be exactly 32 bytes (256 bits) for AES-256-GCM".to_string(),
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| {
            CredentialError::ConfigurationError(format!("Failed to initialize AES-256-GCM cipher: {e}"))
        })?;

        self.cipher = Some(Arc::new(cipher));
        Ok(self)
    }

    /// Redis key for a user's record.
    #[must_use]
    pub fn token_key(&self, user_id: &UserId) -> String {
        format!("{}:token:{}", self.key_prefix, user_id)
    }

    /// TTL in seconds for a record written at `now`.
    ///
    /// Time until expiry plus the retention window, never below the
    /// minimum so already-expired records can still be written.
    #[must_use]
    pub fn ttl_seconds(record: &CredentialRecord, now: DateTime<Utc>) -> u64 {
        let retention = i64::try_from(DURABLE_RETENTION.as_secs()).unwrap_or(i64::MAX);
        let remaining = record.time_to_expiry(now).num_seconds().saturating_add(retention);
        u64::try_from(remaining)
            .unwrap_or(0)
            .max(MIN_DURABLE_TTL.as_secs())
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| CredentialError::Unavailable(format!("Failed to connect to Redis: {e}")))?;

        tracing::info!("Connected to Redis credential store");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Run a Redis operation under the command deadline.
    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let result = match tokio::time::timeout(COMMAND_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(CredentialError::Unavailable(format!(
                "Redis {operation} timed out after {COMMAND_TIMEOUT:?}"
            ))),
        };

        if let Err(CredentialError::Unavailable(reason)) = &result {
            CredentialStoreMetrics::record_durable_failure(operation);
            tracing::debug!(operation, error = %reason, "Redis operation failed");
        }
        result
    }

    fn encode(&self, record: &CredentialRecord) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(record)
            .map_err(|e| CredentialError::SerializationError(e.to_string()))?;

        let Some(cipher) = &self.cipher else {
            return Ok(json);
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, json.as_slice())
            .map_err(|e| CredentialError::SerializationError(format!("Encryption failed: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    // Undecodable payloads are reported as Unavailable: the durable copy is
    // unusable, and the cache may still hold a good one.
    fn decode(&self, payload: &[u8]) -> Result<CredentialRecord> {
        let plaintext;
        let json = match &self.cipher {
            None => payload,
            Some(cipher) => {
                if payload.len() < NONCE_LEN {
                    return Err(CredentialError::Unavailable(
                        "Encrypted record too short (missing nonce)".to_string(),
                    ));
                }
                let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
                plaintext = cipher
                    .decrypt(Nonce::from_slice(nonce), ciphertext)
                    .map_err(|e| CredentialError::Unavailable(format!("Decryption failed: {e}")))?;
                plaintext.as_slice()
            }
        };

        serde_json::from_slice(json)
            .map_err(|e| CredentialError::Unavailable(format!("Corrupt credential record: {e}")))
    }
}

impl std::fmt::Debug for RedisCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCredentialStore")
            .field("key_prefix", &self.key_prefix)
            .field("encrypted", &self.cipher.is_some())
            .finish_non_exhaustive()
    }
}

impl CredentialStore for RedisCredentialStore {
    async fn save(&self, user_id: &UserId, record: &CredentialRecord) -> Result<()> {
        let key = self.token_key(user_id);
        let payload = self.encode(record)?;
        let ttl_seconds = Self::ttl_seconds(record, Utc::now());

        self.with_deadline("save", async {
            let mut conn = self.connection().await?;
            let _: () = conn.set_ex(&key, payload, ttl_seconds).await.map_err(|e| {
                CredentialError::Unavailable(format!("Failed to store credentials: {e}"))
            })?;
            Ok(())
        })
        .await?;

        tracing::debug!(user_id = %user_id, ttl_seconds, "Stored credentials in Redis");
        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<CredentialRecord> {
        let key = self.token_key(user_id);

        let payload: Option<Vec<u8>> = self
            .with_deadline("get", async {
                let mut conn = self.connection().await?;
                conn.get(&key).await.map_err(|e| {
                    CredentialError::Unavailable(format!("Failed to read credentials: {e}"))
                })
            })
            .await?;

        match payload {
            Some(payload) => self.decode(&payload),
            None => Err(CredentialError::NotFound),
        }
    }

    async fn delete(&self, user_id: &UserId) -> Result<()> {
        let key = self.token_key(user_id);

        self.with_deadline("delete", async {
            let mut conn = self.connection().await?;
            let _: () = conn.del(&key).await.map_err(|e| {
                CredentialError::Unavailable(format!("Failed to delete credentials: {e}"))
            })?;
            Ok(())
        })
        .await?;

        tracing::debug!(user_id = %user_id, "Deleted credentials from Redis");
        Ok(())
    }
}

impl LivenessProbe for RedisCredentialStore {
    async fn ping(&self) -> Result<()> {
        self.with_deadline("ping", async {
            let mut conn = self.connection().await?;
            let reply: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| CredentialError::Unavailable(format!("PING failed: {e}")))?;

            if reply == "PONG" {
                Ok(())
            } else {
                Err(CredentialError::Unavailable(format!("Unexpected PING reply: {reply}")))
            }
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    fn record(expires_at: DateTime<Utc>) -> CredentialRecord {
        CredentialRecord {
            access_token: "access_12345".to_string(),
            refresh_token: "refresh_67890".to_string(),
            token_type: "bearer".to_string(),
            expires_at,
            tenant_id: "9991".to_string(),
        }
    }

    #[test]
    fn test_token_key_format() {
        let store = RedisCredentialStore::new("redis://127.0.0.1:6379", "ledgerlink").unwrap();
        assert_eq!(store.token_key(&UserId::from("u1")), "ledgerlink:token:u1");
    }

    #[test]
    fn test_rejects_short_encryption_key() {
        let store = RedisCredentialStore::new("redis://127.0.0.1:6379", "p").unwrap();
        assert!(matches!(
            store.with_encryption_key(&[0u8; 16]),
            Err(CredentialError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_encrypted_payload_hides_tokens() {
        let store = RedisCredentialStore::new("redis://127.0.0.1:6379", "p")
            .unwrap()
            .with_encryption_key(&[42u8; 32])
            .unwrap();
        let original = record(Utc::now());

        let payload = store.encode(&original).unwrap();
        assert!(!String::from_utf8_lossy(&payload).contains("access_12345"));
        assert_eq!(store.decode(&payload).unwrap(), original);
    }

    #[test]
    fn test_payload_from_other_key_is_unavailable() {
        let writer = RedisCredentialStore::new("redis://127.0.0.1:6379", "p")
            .unwrap()
            .with_encryption_key(&[1u8; 32])
            .unwrap();
        let reader = writer.clone().with_encryption_key(&[2u8; 32]).unwrap();

        let payload = writer.encode(&record(Utc::now())).unwrap();
        assert!(matches!(reader.decode(&payload), Err(CredentialError::Unavailable(_))));
        assert!(matches!(reader.decode(b"short"), Err(CredentialError::Unavailable(_))));
    }

    #[test]
    fn test_ttl_for_expired_record_is_clamped_to_retention() {
        let now = Utc::now();
        let ttl = RedisCredentialStore::ttl_seconds(&record(now - ChronoDuration::days(30)), now);
        assert_eq!(ttl, 60);
    }

    proptest! {
        #[test]
        fn prop_ttl_covers_expiry_plus_retention(remaining in -200_000i64..200_000) {
            let now = Utc::now();
            let ttl = RedisCredentialStore::ttl_seconds(
                &record(now + ChronoDuration::seconds(remaining)),
                now,
            );

            let expected = (remaining + 86_400).max(60);
            prop_assert_eq!(i64::try_from(ttl).unwrap(), expected);
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_redis_credential_lifecycle() {
        let store = RedisCredentialStore::new("redis://127.0.0.1:6379", "ledgerlink-test")
            .expect("Failed to create store")
            .with_encryption_key(&[42u8; 32])
            .expect("Invalid key");
        let user_id = UserId::from("lifecycle-user");
        let original = record(Utc::now() + ChronoDuration::hours(1));

        store.ping().await.expect("Redis not reachable");
        store.save(&user_id, &original).await.expect("Failed to save");
        assert_eq!(store.get(&user_id).await.expect("Failed to get"), original);

        store.delete(&user_id).await.expect("Failed to delete");
        assert_eq!(store.get(&user_id).await, Err(CredentialError::NotFound));
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_unavailable() {
        // Nothing listens on port 1.
        let store = RedisCredentialStore::new("redis://127.0.0.1:1", "p").unwrap();

        assert!(matches!(store.ping().await, Err(CredentialError::Unavailable(_))));
        assert!(matches!(
            store.get(&UserId::from("u1")).await,
            Err(CredentialError::Unavailable(_))
        ));
    }
}
