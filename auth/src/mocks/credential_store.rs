//! In-memory credential store.

use crate::error::{CredentialError, Result};
use crate::providers::CredentialStore;
use crate::state::{CredentialRecord, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A call made against [`InMemoryCredentialStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `save(user_id, _)`
    Save(UserId),
    /// `get(user_id)`
    Get(UserId),
    /// `delete(user_id)`
    Delete(UserId),
}

/// In-memory credential store with a simulated outage switch.
///
/// While unavailable every operation fails with `Unavailable` and leaves
/// the contents untouched. Every call is logged, including failed ones.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    records: Arc<Mutex<HashMap<UserId, CredentialRecord>>>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCredentialStore {
    /// Create an empty, available store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (or recovery).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a record directly, bypassing the call log and outage switch.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn insert(&self, user_id: &UserId, record: CredentialRecord) {
        self.records.lock().unwrap().insert(user_id.clone(), record);
    }

    /// Read a record directly, bypassing the call log and outage switch.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn peek(&self, user_id: &UserId) -> Option<CredentialRecord> {
        self.records.lock().unwrap().get(user_id).cloned()
    }

    /// Calls made so far.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn record_call(&self, call: StoreCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CredentialError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl CredentialStore for InMemoryCredentialStore {
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn save(&self, user_id: &UserId, record: &CredentialRecord) -> Result<()> {
        self.record_call(StoreCall::Save(user_id.clone()))?;
        self.records
            .lock()
            .unwrap()
            .insert(user_id.clone(), record.clone());
        Ok(())
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn get(&self, user_id: &UserId) -> Result<CredentialRecord> {
        self.record_call(StoreCall::Get(user_id.clone()))?;
        self.records
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or(CredentialError::NotFound)
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn delete(&self, user_id: &UserId) -> Result<()> {
        self.record_call(StoreCall::Delete(user_id.clone()))?;
        self.records.lock().unwrap().remove(user_id);
        Ok(())
    }
}
