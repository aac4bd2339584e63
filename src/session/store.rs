//! Refresh token storage.
//!
//! Only refresh tokens are tracked server-side, keyed by the full token
//! string. Access tokens are stateless and short-lived. The store is a trait
//! so a process-local map and a shared-cache-backed implementation are
//! interchangeable; the chosen implementation is injected at startup.

use std::collections::HashMap;
use std::sync::Mutex;

/// Server-side record for one active refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub owner_id: i64,
    pub family_id: String,
}

/// Storage failure outside the protocol's error taxonomy. Surfaces as a 500
/// at the HTTP boundary, never as an authentication failure.
#[derive(Debug)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "refresh store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Store for active refresh tokens.
///
/// Every operation must be atomic with respect to concurrent requests for
/// the same token.
#[async_trait::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert or replace the record for a token string.
    async fn put(&self, token: &str, record: RefreshRecord) -> Result<(), StoreError>;

    /// Look up the record for a token string without consuming it.
    async fn get(&self, token: &str) -> Result<Option<RefreshRecord>, StoreError>;

    /// Remove the record for a token string, returning it if it was present.
    /// Absent-if-missing is not an error. Returning the record makes
    /// check-and-consume a single step: under concurrent calls for the same
    /// token, exactly one caller receives the record.
    async fn remove(&self, token: &str) -> Result<Option<RefreshRecord>, StoreError>;

    /// Remove every record belonging to an owner (logout on all devices).
    /// Returns how many records were removed.
    async fn remove_all_for_owner(&self, owner_id: i64) -> Result<u64, StoreError>;
}

/// Process-local store backed by a mutex-guarded map. One lock serializes
/// all operations, which is sufficient at expected request volumes.
#[derive(Default)]
pub struct MemoryRefreshStore {
    records: Mutex<HashMap<String, RefreshRecord>>,
}

impl MemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for MemoryRefreshStore {
    async fn put(&self, token: &str, record: RefreshRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("refresh store lock poisoned");
        records.insert(token.to_string(), record);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let records = self.records.lock().expect("refresh store lock poisoned");
        Ok(records.get(token).cloned())
    }

    async fn remove(&self, token: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let mut records = self.records.lock().expect("refresh store lock poisoned");
        Ok(records.remove(token))
    }

    async fn remove_all_for_owner(&self, owner_id: i64) -> Result<u64, StoreError> {
        let mut records = self.records.lock().expect("refresh store lock poisoned");
        let before = records.len();
        records.retain(|_, record| record.owner_id != owner_id);
        Ok((before - records.len()) as u64)
    }
}
