use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::clock::{SharedClock, SystemClock};

/// Errors produced by object store engines.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Requested key does not exist or has expired.
    #[error("entry not found for key: {key}")]
    NotFound { key: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Metadata attached to an object at write time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Absolute expiry in epoch milliseconds.
    pub ttl: i64,
}

/// Options for [`ObjectStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOptions {
    /// Seconds until the engine treats the entry as absent.
    pub expiration_ttl: u64,
    pub metadata: Option<ObjectMetadata>,
}

/// Value plus the metadata recorded alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub value: Vec<u8>,
    pub metadata: Option<ObjectMetadata>,
}

/// Key-value engine with per-entry TTL, keyed by opaque strings.
///
/// Engines have no knowledge of capability semantics; they only enforce
/// expiry and report expired entries as [`StoreError::NotFound`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist a value under a key, overwriting any existing entry and resetting its TTL.
    async fn put(&self, key: &str, value: &[u8], options: PutOptions) -> Result<(), StoreError>;

    /// Retrieve the value for a key.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        Ok(self.get_with_metadata(key).await?.value)
    }

    /// Retrieve the value for a key together with its metadata.
    async fn get_with_metadata(&self, key: &str) -> Result<StoredObject, StoreError>;

    /// Remove a key and its value (idempotent).
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Milliseconds after `now_millis` at which a put with `ttl_secs` expires.
pub fn expiry_after(now_millis: i64, ttl_secs: u64) -> i64 {
    let ttl_millis = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    now_millis.saturating_add(ttl_millis)
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: i64,
    metadata: Option<ObjectMetadata>,
}

/// In-memory engine for tests, smoke runs and single-process deployments.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
    clock: SharedClock,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of entries still held, expired or not.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes stored under a key, ignoring expiry.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let map = self.inner.lock().ok()?;
        map.get(key).map(|entry| entry.value.clone())
    }

    /// Keys currently held, ignoring expiry.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        let now = self.clock.now_millis();
        let before = map.len();
        map.retain(|_, entry| entry.expires_at > now);
        Ok(before - map.len())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, value: &[u8], options: PutOptions) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        let expires_at = expiry_after(self.clock.now_millis(), options.expiration_ttl);
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
                metadata: options.metadata,
            },
        );
        Ok(())
    }

    async fn get_with_metadata(&self, key: &str) -> Result<StoredObject, StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        let not_found = || StoreError::NotFound {
            key: key.to_string(),
        };
        let entry = map.get(key).cloned().ok_or_else(not_found)?;

        if entry.expires_at <= self.clock.now_millis() {
            debug!("dropping expired entry");
            map.remove(key);
            return Err(not_found());
        }

        Ok(StoredObject {
            value: entry.value,
            metadata: entry.metadata,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(key);
        Ok(())
    }
}
