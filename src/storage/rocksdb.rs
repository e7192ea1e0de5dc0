use std::path::Path;

use async_trait::async_trait;
use rocksdb::{IteratorMode, DB};

use crate::storage::{Storage, StorageError};

/// RocksDB-backed token cache
pub struct RocksDBStorage {
    db: DB,
}

impl RocksDBStorage {
    /// Open (or create) a RocksDB database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&path)
            .map_err(|e| StorageError::StorageError(format!("Failed to create DB directory: {e}")))?;

        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        options.set_use_fsync(true);
        options.set_keep_log_file_num(10);

        let db = DB::open(&options, path)
            .map_err(|e| StorageError::StorageError(format!("Failed to open RocksDB: {e}")))?;

        Ok(Self { db })
    }
}

impl Drop for RocksDBStorage {
    fn drop(&mut self) {
        // Flush pending writes before closing
        let _ = self.db.flush();
    }
}

#[async_trait]
impl Storage for RocksDBStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key.as_bytes())
            .map_err(|e| StorageError::StorageError(format!("Failed to get key: {e}")))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.db
            .put(key.as_bytes(), value)
            .map_err(|e| StorageError::StorageError(format!("Failed to set key: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.db
            .delete(key.as_bytes())
            .map_err(|e| StorageError::StorageError(format!("Failed to delete key: {e}")))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.db
            .get(key.as_bytes())
            .map(|v| v.is_some())
            .map_err(|e| StorageError::StorageError(format!("Failed to check key existence: {e}")))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let iter = self.db.iterator(IteratorMode::From(
            prefix.as_bytes(),
            rocksdb::Direction::Forward,
        ));

        let mut keys = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| {
                StorageError::StorageError(format!("Failed to iterate over keys: {e}"))
            })?;

            let key_str = String::from_utf8_lossy(&key).to_string();
            if key_str.starts_with(prefix) {
                keys.push(key_str);
            } else {
                break;
            }
        }

        Ok(keys)
    }
}
