//! # RocksDB Storage Adapter
//!
//! Durable implementation of [`KeyValueStore`].
//!
//! - Atomic batch writes (WriteBatch)
//! - Snappy compression
//! - Bloom filters for point lookups
//! - Optional fsync on every write

use crate::ports::{full_key, BatchOperation, KeyValueStore};
use rocksdb::{BlockBasedOptions, Cache, DBCompressionType, Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use shared_types::StorageError;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: String,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
    /// Enable fsync after each write (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/decided".to_string(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            max_write_buffer_number: 3,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Small buffers, no sync.
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            max_write_buffer_number: 2,
            sync_writes: false,
        }
    }
}

pub struct RocksDbStore {
    db: DB,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create a database.
    pub fn open(config: RocksDbConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path)
            .map_err(|e| db_error("open", e))?;
        tracing::info!(path = %config.path, "[storage] RocksDB opened");

        Ok(Self { db, config })
    }

    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open(RocksDbConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

fn db_error(op: &str, e: rocksdb::Error) -> StorageError {
    StorageError::DatabaseError(format!("RocksDB {} failed: {}", op, e))
}

impl KeyValueStore for RocksDbStore {
    fn put(&self, prefix: &[u8], key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .put_opt(full_key(prefix, key), value, &self.write_options())
            .map_err(|e| db_error("put", e))
    }

    fn get(&self, prefix: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(full_key(prefix, key))
            .map_err(|e| db_error("get", e))
    }

    fn get_all_by_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut results = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| db_error("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key[prefix.len()..].to_vec(), value.to_vec()));
        }
        Ok(results)
    }

    fn delete(&self, prefix: &[u8], key: &[u8]) -> Result<(), StorageError> {
        self.db
            .delete_opt(full_key(prefix, key), &self.write_options())
            .map_err(|e| db_error("delete", e))
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }
        self.db
            .write_opt(batch, &self.write_options())
            .map_err(|e| db_error("batch write", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RocksDbStore {
        let path = dir.path().to_string_lossy().to_string();
        RocksDbStore::open(RocksDbConfig::for_testing(path)).unwrap()
    }

    #[test]
    fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put(b"p/", b"k", b"v").unwrap();
        assert_eq!(store.get(b"p/", b"k").unwrap(), Some(b"v".to_vec()));

        store.delete(b"p/", b"k").unwrap();
        assert_eq!(store.get(b"p/", b"k").unwrap(), None);
    }

    #[test]
    fn test_prefix_scan_is_ordered_and_bounded() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"a/", &2u64.to_be_bytes(), b"two".to_vec()),
                BatchOperation::put(b"a/", &1u64.to_be_bytes(), b"one".to_vec()),
                BatchOperation::put(b"b/", &1u64.to_be_bytes(), b"other".to_vec()),
            ])
            .unwrap();

        let values: Vec<Vec<u8>> = store
            .get_all_by_prefix(b"a/")
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.put(b"p/", b"k", b"v").unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.get(b"p/", b"k").unwrap(), Some(b"v".to_vec()));
    }
}
