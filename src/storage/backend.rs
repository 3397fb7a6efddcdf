//! Versioned key-value backends
//!
//! A backend stores one serialized collection per key together with a
//! monotonically increasing version. Writers that must not lose concurrent
//! updates use [`KeyValueBackend::compare_and_swap`].

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// A stored value and the version it was written at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: String,
    pub version: u64,
}

/// Storage contract shared by the persistent and in-memory stores
///
/// Versions start at 1 for a newly created key and increase by one on every
/// successful write.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Reads the current value of `key`
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>>;

    /// Writes `value` only if the stored version still equals `expected`
    ///
    /// # Arguments
    ///
    /// * `key` - Collection key
    /// * `expected` - Version read earlier, or `None` when the key was absent
    /// * `value` - Serialized collection
    ///
    /// # Returns
    ///
    /// Returns `Some(new_version)` when the write was applied and `None` when
    /// another writer got there first
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<Option<u64>>;

    /// Unconditionally writes `value`, returning the new version
    async fn put(&self, key: &str, value: String) -> Result<u64>;

    /// Removes `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local backend used by tests and ephemeral contexts
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, VersionedValue>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<Option<u64>> {
        let mut entries = self.entries.lock().await;
        let current = entries.get(key).map(|entry| entry.version);
        if current != expected {
            return Ok(None);
        }
        let version = current.unwrap_or(0) + 1;
        entries.insert(key.to_string(), VersionedValue { value, version });
        Ok(Some(version))
    }

    async fn put(&self, key: &str, value: String) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let version = entries.get(key).map(|entry| entry.version).unwrap_or(0) + 1;
        entries.insert(key.to_string(), VersionedValue { value, version });
        Ok(version)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
