//! In-process key-value store backed by DashMap for lock-free concurrent
//! access. Used as the session store and as the fake in tests.

use crate::store::{KeyValueStore, StoreError, StoreResult};
use dashmap::DashMap;
use std::sync::Arc;

/// Lock-free in-memory store. Entries never expire.
pub struct LocalStore {
    store: Arc<DashMap<String, String>>,
    max_entries: Option<usize>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            max_entries: None,
        }
    }

    /// Bounded store: inserting a new key beyond `max_entries` fails with
    /// [`StoreError::Full`]; existing keys can still be overwritten.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(max_entries)),
            max_entries: Some(max_entries),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Snapshot of all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.store.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for LocalStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.store.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        if let Some(max) = self.max_entries {
            if self.store.len() >= max && !self.store.contains_key(key) {
                return Err(StoreError::Full(key.to_string()));
            }
        }
        self.store.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.store.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = LocalStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_refuses_new_keys_only() {
        let store = LocalStore::with_capacity(2);
        store.set("a", "1").unwrap();
        store.set("b", "1").unwrap();

        assert!(matches!(store.set("c", "1"), Err(StoreError::Full(_))));
        store.set("a", "overwritten").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("overwritten"));
        assert_eq!(store.keys(), vec!["a", "b"]);
    }
}
