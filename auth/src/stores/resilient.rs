//! Two-tier credential store with cache fallback.
//!
//! [`ResilientCredentialStore`] keeps every record in an in-process cache and
//! mirrors it to a durable store while a [`HealthSignal`] says the durable
//! tier is trusted. When it is not, reads and writes are served by the cache
//! alone, and a background reconciliation pass pushes cached records back to
//! the durable tier once it recovers.
//!
//! ```text
//!   save ──▶ cache ──(trusted)──▶ durable
//!   get  ──(trusted)──▶ durable ──ok──▶ cache ──▶ caller
//!                          │
//!                          └─err / untrusted──▶ cache ──▶ caller | NotFound
//! ```
//!
//! The cache lock is held only for map access. Durable I/O always happens
//! after it is released.

use crate::error::{CredentialError, Result};
use crate::providers::{CredentialStore, HealthSignal};
use crate::state::{CredentialRecord, UserId};
use ledgerlink_runtime::PeriodicTask;
use ledgerlink_runtime::metrics::CredentialStoreMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Records written to the durable tier.
    pub pushed: usize,
    /// Records whose durable write failed.
    pub failed: usize,
    /// Whether the pass was skipped because the durable tier was untrusted.
    pub skipped: bool,
}

/// Credential store that survives durable-tier outages.
///
/// Cloning is cheap; clones share the cache.
pub struct ResilientCredentialStore<D, H> {
    durable: Arc<D>,
    health: H,
    cache: Arc<RwLock<HashMap<UserId, CredentialRecord>>>,
}

impl<D, H: Clone> Clone for ResilientCredentialStore<D, H> {
    fn clone(&self) -> Self {
        Self {
            durable: Arc::clone(&self.durable),
            health: self.health.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<D, H> ResilientCredentialStore<D, H>
where
    D: CredentialStore + 'static,
    H: HealthSignal + Clone + 'static,
{
    /// Compose a durable store with a health signal.
    #[must_use]
    pub fn new(durable: D, health: H) -> Self {
        Self {
            durable: Arc::new(durable),
            health,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The durable tier.
    #[must_use]
    pub fn durable(&self) -> &D {
        &self.durable
    }

    /// The health signal consulted on every call.
    #[must_use]
    pub const fn health(&self) -> &H {
        &self.health
    }

    /// Number of records in the cache.
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Push every cached record to the durable tier.
    ///
    /// Does nothing while the durable tier is untrusted. Per-record failures
    /// are logged and counted; the pass always completes.
    pub async fn reconcile_once(&self) -> ReconciliationReport {
        if !self.health.is_healthy() {
            tracing::debug!("Skipping reconciliation, durable tier untrusted");
            return ReconciliationReport {
                skipped: true,
                ..ReconciliationReport::default()
            };
        }

        let snapshot: Vec<(UserId, CredentialRecord)> = {
            let cache = self.cache.read().await;
            cache
                .iter()
                .map(|(user_id, record)| (user_id.clone(), record.clone()))
                .collect()
        };

        let mut report = ReconciliationReport::default();
        for (user_id, record) in &snapshot {
            match self.durable.save(user_id, record).await {
                Ok(()) => report.pushed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(user_id = %user_id, error = %e, "Failed to reconcile credentials");
                }
            }
        }

        CredentialStoreMetrics::record_reconciliation(report.pushed, report.failed);
        if !snapshot.is_empty() {
            tracing::info!(
                pushed = report.pushed,
                failed = report.failed,
                "Reconciled cached credentials to durable tier"
            );
        }
        report
    }

    /// Run [`reconcile_once`](Self::reconcile_once) every `interval`.
    ///
    /// The first pass runs one interval from now.
    #[must_use]
    pub fn start_reconciliation(&self, interval: Duration) -> PeriodicTask {
        let store = self.clone();
        PeriodicTask::spawn("credential_reconciliation", interval, move || {
            let store = store.clone();
            async move {
                store.reconcile_once().await;
            }
        })
    }

    async fn cached(&self, user_id: &UserId) -> Result<CredentialRecord> {
        let cache = self.cache.read().await;
        cache.get(user_id).cloned().ok_or(CredentialError::NotFound)
    }
}

impl<D, H> CredentialStore for ResilientCredentialStore<D, H>
where
    D: CredentialStore + 'static,
    H: HealthSignal + Clone + 'static,
{
    async fn save(&self, user_id: &UserId, record: &CredentialRecord) -> Result<()> {
        self.cache
            .write()
            .await
            .insert(user_id.clone(), record.clone());

        if self.health.is_healthy() {
            match self.durable.save(user_id, record).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %e,
                        "Durable save failed, record kept in cache"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        error = %e,
                        "Durable save rejected record, kept in cache only"
                    );
                }
            }
        } else {
            tracing::debug!(user_id = %user_id, "Durable tier untrusted, saved to cache only");
        }

        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<CredentialRecord> {
        if self.health.is_healthy() {
            match self.durable.get(user_id).await {
                Ok(record) => {
                    self.cache
                        .write()
                        .await
                        .insert(user_id.clone(), record.clone());
                    return Ok(record);
                }
                Err(CredentialError::NotFound) => {
                    tracing::debug!(user_id = %user_id, "Not in durable tier, checking cache");
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %e,
                        "Durable read failed, falling back to cache"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        error = %e,
                        "Durable read returned unexpected error, falling back to cache"
                    );
                }
            }
        }

        CredentialStoreMetrics::record_cache_fallback();
        self.cached(user_id).await
    }

    async fn delete(&self, user_id: &UserId) -> Result<()> {
        self.cache.write().await.remove(user_id);

        if self.health.is_healthy() {
            if let Err(e) = self.durable.delete(user_id).await {
                tracing::warn!(user_id = %user_id, error = %e, "Durable delete failed");
            }
        }

        Ok(())
    }
}

impl<D, H> std::fmt::Debug for ResilientCredentialStore<D, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientCredentialStore").finish_non_exhaustive()
    }
}
