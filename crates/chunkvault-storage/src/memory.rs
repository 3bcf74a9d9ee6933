//! In-process blob store.
//!
//! Used for tests and for local experimentation (`STORAGE_BACKEND=memory`). Content
//! is lost when the process exits.

use crate::traits::{ByteReader, ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

/// Blobs are stored whole; streams yield them in fixed-size pieces.
const STREAM_PIECE_SIZE: usize = 64 * 1024;

#[derive(Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    fn validate_key(storage_key: &str) -> StorageResult<()> {
        if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid characters: {:?}",
                storage_key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put_stream(&self, storage_key: &str, mut reader: ByteReader) -> StorageResult<u64> {
        Self::validate_key(storage_key)?;

        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to read stream: {}", e)))?;

        let size = data.len() as u64;
        self.blobs
            .write()
            .await
            .insert(storage_key.to_string(), Bytes::from(data));

        tracing::debug!(key = %storage_key, size_bytes = size, "Memory storage put");
        Ok(size)
    }

    async fn get_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        Self::validate_key(storage_key)?;

        let data = self
            .blobs
            .read()
            .await
            .get(storage_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))?;

        let pieces: Vec<Result<Bytes, StorageError>> = (0..data.len())
            .step_by(STREAM_PIECE_SIZE)
            .map(|offset| Ok(data.slice(offset..(offset + STREAM_PIECE_SIZE).min(data.len()))))
            .collect();

        Ok(Box::pin(futures::stream::iter(pieces)))
    }

    async fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        Self::validate_key(storage_key)?;

        self.blobs
            .read()
            .await
            .get(storage_key)
            .map(|data| data.to_vec())
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        Self::validate_key(storage_key)?;
        self.blobs.write().await.remove(storage_key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        Self::validate_key(prefix)?;
        if !prefix.ends_with('/') {
            return Err(StorageError::InvalidKey(format!(
                "Prefix must end with '/': {:?}",
                prefix
            )));
        }

        let mut blobs = self.blobs.write().await;
        let before = blobs.len();
        blobs.retain(|key, _| !key.starts_with(prefix));
        tracing::debug!(prefix = %prefix, removed = before - blobs.len(), "Memory storage prefix delete");
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        Self::validate_key(storage_key)?;
        Ok(self.blobs.read().await.contains_key(storage_key))
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        Self::validate_key(storage_key)?;
        self.blobs
            .read()
            .await
            .get(storage_key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn rename(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        Self::validate_key(from_key)?;
        Self::validate_key(to_key)?;

        let mut blobs = self.blobs.write().await;
        let data = blobs
            .remove(from_key)
            .ok_or_else(|| StorageError::NotFound(from_key.to_string()))?;
        blobs.insert(to_key.to_string(), data);
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
