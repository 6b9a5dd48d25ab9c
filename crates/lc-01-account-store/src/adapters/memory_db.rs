use crate::domain::StoreError;
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory key-value store. Backs the proof trie's node table.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn batch(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
