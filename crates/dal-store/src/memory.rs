//! In-memory store
//!
//! Keys live in a radix trie so prefix scans walk only the matching subtree.

use crate::error::StoreResult;
use crate::store::{KeyValueStore, StoredValue, ValueKind};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};

/// Process-local key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Trie<String, StoredValue>>,
}

impl MemoryStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every key, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read();
        let mut keys: Vec<String> = (&*entries).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Raw payload at `key`
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<StoredValue> {
        self.entries.read().get(&key.to_string()).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>> {
        if prefix.is_empty() {
            return Ok(self.keys());
        }
        let entries = self.entries.read();
        let mut keys: Vec<String> = entries
            .get_raw_descendant(&prefix.to_string())
            .map(|subtrie| {
                subtrie
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn kind(&self, key: &str) -> StoreResult<Option<ValueKind>> {
        Ok(self
            .entries
            .read()
            .get(&key.to_string())
            .map(StoredValue::kind))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.entries.read().get(&key.to_string()) {
            None => Ok(None),
            Some(StoredValue::Scalar(bytes)) => Ok(Some(bytes.clone())),
            Some(other) => Err(other.mismatch(key, ValueKind::Scalar)),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), StoredValue::Scalar(value));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<usize> {
        let mut entries = self.entries.write();
        Ok(keys
            .iter()
            .filter(|key| entries.remove(*key).is_some())
            .count())
    }

    async fn get_map(&self, key: &str) -> StoreResult<IndexMap<String, Vec<u8>>> {
        match self.entries.read().get(&key.to_string()) {
            None => Ok(IndexMap::new()),
            Some(StoredValue::Map(map)) => Ok(map.clone()),
            Some(other) => Err(other.mismatch(key, ValueKind::Map)),
        }
    }

    async fn set_map_field(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let owned = key.to_string();
        match entries.get_mut(&owned) {
            Some(StoredValue::Map(map)) => {
                map.insert(field.to_string(), value);
            }
            Some(other) => return Err(other.mismatch(key, ValueKind::Map)),
            None => {
                let mut map = IndexMap::new();
                map.insert(field.to_string(), value);
                entries.insert(owned, StoredValue::Map(map));
            }
        }
        Ok(())
    }

    async fn get_sequence(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        match self.entries.read().get(&key.to_string()) {
            None => Ok(Vec::new()),
            Some(StoredValue::Sequence(items)) => Ok(items.clone()),
            Some(other) => Err(other.mismatch(key, ValueKind::Sequence)),
        }
    }

    async fn append_sequence(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let owned = key.to_string();
        match entries.get_mut(&owned) {
            Some(StoredValue::Sequence(items)) => items.push(value),
            Some(other) => return Err(other.mismatch(key, ValueKind::Sequence)),
            None => {
                entries.insert(owned, StoredValue::Sequence(vec![value]));
            }
        }
        Ok(())
    }
}
