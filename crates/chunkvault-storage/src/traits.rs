//! Storage abstraction trait
//!
//! This module defines the Storage trait that all blob store backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chunkvault_core::AppError;
use futures::Stream;
use std::io;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stream of blob bytes as produced by `Storage::get_stream`
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Reader handed to `Storage::put_stream`
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

impl From<StorageError> for io::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::IoError(e) => e,
            StorageError::NotFound(key) => {
                io::Error::new(io::ErrorKind::NotFound, format!("blob not found: {}", key))
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Blob {}", key)),
            other => AppError::IoFault(other.to_string()),
        }
    }
}

/// Blob store abstraction
///
/// Keys are opaque strings built by the `keys` module. Writes to an existing key
/// replace its content.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write a blob from a reader, consuming it until EOF.
    ///
    /// Returns the number of bytes written.
    async fn put_stream(&self, storage_key: &str, reader: ByteReader) -> StorageResult<u64>;

    /// Write a blob from an in-memory buffer
    async fn put(&self, storage_key: &str, data: Bytes) -> StorageResult<u64> {
        let reader: ByteReader = Box::pin(io::Cursor::new(data));
        self.put_stream(storage_key, reader).await
    }

    /// Read a blob as a stream of byte chunks
    async fn get_stream(&self, storage_key: &str) -> StorageResult<ByteStream>;

    /// Read a whole blob into memory
    async fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        use futures::TryStreamExt;

        let mut stream = self.get_stream(storage_key).await?;
        let mut data = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    /// Delete a blob. Deleting a missing key succeeds.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Delete every blob whose key starts with `prefix`.
    ///
    /// `prefix` must end with `/`. Succeeds when nothing matches.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()>;

    /// Check if a blob exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Get the size in bytes of a blob, if it exists.
    async fn content_length(&self, storage_key: &str) -> StorageResult<u64>;

    /// Move a blob to a new key, replacing any blob already stored there.
    ///
    /// Readers observe either the old destination content or the new one, never a
    /// partial write.
    async fn rename(&self, from_key: &str, to_key: &str) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_app_not_found() {
        let err: AppError = StorageError::NotFound("files/x/assembled".to_string()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_other_errors_map_to_io_fault() {
        let err: AppError = StorageError::UploadFailed("disk full".to_string()).into();
        assert!(matches!(err, AppError::IoFault(_)));
    }

    #[test]
    fn test_io_error_round_trip_keeps_kind() {
        let err: io::Error = StorageError::NotFound("k".to_string()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error =
            StorageError::IoError(io::Error::new(io::ErrorKind::PermissionDenied, "no")).into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
