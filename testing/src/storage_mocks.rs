//! In-memory storage backend for tests.
//!
//! [`InMemoryStorage`] is a `HashMap`-backed [`Storage`] that can also be told
//! to fail reads or writes for specific keys, which is how tests exercise the
//! seed fallback and compensation paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use easypark_core::storage::{Storage, StorageError};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Inner {
    data: BTreeMap<String, Vec<u8>>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    writes: usize,
}

/// In-memory storage for fast, deterministic testing.
///
/// Clones share the same underlying map, so a test can keep a handle to
/// inspect what a service wrote.
///
/// # Example
///
/// ```
/// use easypark_testing::InMemoryStorage;
/// use easypark_core::storage::Storage;
///
/// let storage = InMemoryStorage::new();
/// storage.save("easypark_tariffs", b"[]").unwrap();
/// assert_eq!(storage.load("easypark_tariffs").unwrap(), Some(b"[]".to_vec()));
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under a key, bypassing failure injection
    ///
    /// Useful for planting corrupt JSON.
    pub fn put_raw(&self, key: &str, bytes: &[u8]) {
        self.inner
            .write()
            .unwrap()
            .data
            .insert(key.to_string(), bytes.to_vec());
    }

    /// Read raw bytes for a key, bypassing failure injection
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().unwrap().data.get(key).cloned()
    }

    /// Make every subsequent `load` of `key` fail
    pub fn fail_reads_for(&self, key: &str) {
        self.inner
            .write()
            .unwrap()
            .failing_reads
            .insert(key.to_string());
    }

    /// Make every subsequent `save` or `remove` of `key` fail
    pub fn fail_writes_for(&self, key: &str) {
        self.inner
            .write()
            .unwrap()
            .failing_writes
            .insert(key.to_string());
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.failing_reads.clear();
        inner.failing_writes.clear();
    }

    /// Check if a key exists in the store
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().unwrap().data.contains_key(key)
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().data.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().data.is_empty()
    }

    /// Number of successful `save` calls so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.read().unwrap().writes
    }
}

impl Storage for InMemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let inner = self.inner.read().unwrap();
        if inner.failing_reads.contains(key) {
            return Err(StorageError::Read {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(inner.data.get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap();
        if inner.failing_writes.contains(key) {
            return Err(StorageError::Write {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        inner.data.insert(key.to_string(), value.to_vec());
        inner.writes += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap();
        if inner.failing_writes.contains(key) {
            return Err(StorageError::Write {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        inner.data.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.inner.read().unwrap().data.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let storage = InMemoryStorage::new();
        assert!(storage.is_empty());

        storage.save("k", b"v").unwrap();
        assert_eq!(storage.load("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn test_injected_failures() {
        let storage = InMemoryStorage::new();
        storage.put_raw("k", b"v");

        storage.fail_reads_for("k");
        assert!(matches!(storage.load("k"), Err(StorageError::Read { .. })));

        storage.fail_writes_for("k");
        assert!(matches!(storage.save("k", b"w"), Err(StorageError::Write { .. })));
        assert!(matches!(storage.remove("k"), Err(StorageError::Write { .. })));

        storage.heal();
        assert_eq!(storage.load("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_clones_share_data() {
        let storage = InMemoryStorage::new();
        let handle = storage.clone();
        storage.save("a", b"1").unwrap();
        storage.save("b", b"2").unwrap();
        assert_eq!(handle.keys().unwrap(), vec!["a", "b"]);
        handle.remove("a").unwrap();
        assert!(!storage.contains_key("a"));
    }
}
