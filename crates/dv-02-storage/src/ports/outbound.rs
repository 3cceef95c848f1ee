//! Driven ports (Outbound dependencies)

use shared_types::StorageError;

/// Prefix-addressed key-value store.
///
/// A record is addressed by `prefix ++ key`. Implementations are shared
/// between tasks, so every method takes `&self`.
pub trait KeyValueStore: Send + Sync {
    fn put(&self, prefix: &[u8], key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn get(&self, prefix: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Every record under `prefix`, ordered by key, with the prefix stripped.
    fn get_all_by_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    fn delete(&self, prefix: &[u8], key: &[u8]) -> Result<(), StorageError>;

    /// Apply every operation or none.
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    pub fn put(prefix: &[u8], key: &[u8], value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: full_key(prefix, key),
            value: value.into(),
        }
    }

    pub fn delete(prefix: &[u8], key: &[u8]) -> Self {
        BatchOperation::Delete {
            key: full_key(prefix, key),
        }
    }
}

/// `prefix ++ key`.
pub fn full_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(prefix.len() + key.len());
    full.extend_from_slice(prefix);
    full.extend_from_slice(key);
    full
}
