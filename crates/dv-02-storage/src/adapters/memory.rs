//! In-memory key-value store

use crate::ports::{full_key, BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use shared_types::StorageError;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered in-memory store. Prefix scans are range queries over the map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for InMemoryStore {
    fn put(&self, prefix: &[u8], key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.data.write().insert(full_key(prefix, key), value.to_vec());
        Ok(())
    }

    fn get(&self, prefix: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().get(&full_key(prefix, key)).cloned())
    }

    fn get_all_by_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let data = self.data.read();
        let records = data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k[prefix.len()..].to_vec(), v.clone()))
            .collect();
        Ok(records)
    }

    fn delete(&self, prefix: &[u8], key: &[u8]) -> Result<(), StorageError> {
        self.data.write().remove(&full_key(prefix, key));
        Ok(())
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        let mut data = self.data.write();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_scan_strips_prefix_and_stops_at_boundary() {
        let store = InMemoryStore::new();
        store.put(b"a/", b"2", b"two").unwrap();
        store.put(b"a/", b"1", b"one").unwrap();
        store.put(b"b/", b"1", b"other").unwrap();
        store.put(b"a", b"x", b"shorter prefix").unwrap();

        let records = store.get_all_by_prefix(b"a/").unwrap();
        assert_eq!(
            records,
            vec![
                (b"1".to_vec(), b"one".to_vec()),
                (b"2".to_vec(), b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn test_delete_and_batch() {
        let store = InMemoryStore::new();
        store.put(b"p/", b"k", b"v").unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::delete(b"p/", b"k"),
                BatchOperation::put(b"p/", b"j", b"w".to_vec()),
            ])
            .unwrap();

        assert_eq!(store.get(b"p/", b"k").unwrap(), None);
        assert_eq!(store.get(b"p/", b"j").unwrap(), Some(b"w".to_vec()));
        store.delete(b"p/", b"j").unwrap();
        assert!(store.is_empty());
    }
}
