use crate::domain::StoreError;

/// Narrow key-value port shared by the canonical snapshot, the proof trie
/// and the trie's node storage.
///
/// Implementations use interior mutability; every method takes `&self`.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Apply all operations, or none of them.
    fn batch(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError>;

    /// Every entry whose key starts with `prefix`.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            BatchOperation::Put { key, .. } | BatchOperation::Delete { key } => key,
        }
    }
}
