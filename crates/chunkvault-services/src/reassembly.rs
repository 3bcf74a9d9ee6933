//! Reassembly coordinator
//!
//! Concatenates a file's chunk payloads, in ascending chunk-number order, into the
//! assembled blob once every chunk is completed. Output goes to a scratch key first
//! and is renamed onto the final key, so a failed attempt never exposes a partial
//! blob. A file is assembled at most once; later triggers are no-ops.

use chunkvault_core::models::{FileRecord, UploadRecord, UploadStatus};
use chunkvault_core::AppError;
use chunkvault_db::{FileRepository, UploadRepository};
use chunkvault_storage::traits::ByteReader;
use chunkvault_storage::{keys, Storage};
use futures::stream::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::StreamReader;
use uuid::Uuid;

use crate::locks::{FileLockGuard, FileLocks};

/// Result of a reassembly trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReassemblyOutcome {
    /// The file was already assembled; nothing was written
    AlreadyCompleted,
    /// Some chunks are not completed yet
    Incomplete { missing_chunks: Vec<i32> },
    /// This trigger wrote and published the assembled blob
    Assembled { size_bytes: i64 },
}

#[derive(Clone)]
pub struct ReassemblyCoordinator {
    files: Arc<dyn FileRepository>,
    uploads: Arc<dyn UploadRepository>,
    storage: Arc<dyn Storage>,
    locks: FileLocks,
}

impl ReassemblyCoordinator {
    pub fn new(
        files: Arc<dyn FileRepository>,
        uploads: Arc<dyn UploadRepository>,
        storage: Arc<dyn Storage>,
        locks: FileLocks,
    ) -> Self {
        Self {
            files,
            uploads,
            storage,
            locks,
        }
    }

    /// Handle a chunk-completion event for `file_id`.
    #[tracing::instrument(skip(self), fields(file_id = %file_id))]
    pub async fn on_chunk_completed(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
    ) -> Result<ReassemblyOutcome, AppError> {
        let guard = self.locks.acquire(file_id).await?;
        self.reassemble_locked(&guard, owner_id).await
    }

    /// Check and, if every chunk is completed, assemble the file.
    ///
    /// The caller must hold the file's lock; state is re-read here so decisions
    /// made before acquiring it do not leak in.
    pub async fn reassemble_locked(
        &self,
        guard: &FileLockGuard,
        owner_id: Uuid,
    ) -> Result<ReassemblyOutcome, AppError> {
        let file_id = guard.file_id();
        let file = self
            .files
            .get(owner_id, file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;

        if file.is_assembled() {
            tracing::debug!(file_id = %file_id, "File already assembled; skipping");
            return Ok(ReassemblyOutcome::AlreadyCompleted);
        }

        let mut uploads = self.uploads.list_for_file(file_id).await?;
        uploads.sort_by_key(|u| u.chunk_number);

        let missing_chunks: Vec<i32> = uploads
            .iter()
            .filter(|u| u.status != UploadStatus::Completed)
            .map(|u| u.chunk_number)
            .collect();
        if !missing_chunks.is_empty() || uploads.len() != file.expected_chunk_count as usize {
            return Ok(ReassemblyOutcome::Incomplete { missing_chunks });
        }

        let start = Instant::now();
        let final_key = keys::assembled_key(file_id);
        let size_bytes = match self.assemble(&file, &uploads, &final_key).await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(
                    file_id = %file_id,
                    error = %e,
                    "Reassembly failed; file stays in progress"
                );
                return Err(e);
            }
        };

        if !self
            .files
            .mark_assembled(file_id, &final_key, size_bytes)
            .await?
        {
            tracing::warn!(file_id = %file_id, "File was assembled concurrently");
            return Ok(ReassemblyOutcome::AlreadyCompleted);
        }

        tracing::info!(
            file_id = %file_id,
            storage_key = %final_key,
            size_bytes = size_bytes,
            parts = uploads.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File reassembled from chunks"
        );

        Ok(ReassemblyOutcome::Assembled { size_bytes })
    }

    /// Stream every chunk into a scratch blob, verify its size, publish it.
    async fn assemble(
        &self,
        file: &FileRecord,
        uploads: &[UploadRecord],
        final_key: &str,
    ) -> Result<i64, AppError> {
        let temp_key = keys::assembly_temp_key(file.id, Uuid::new_v4());

        let chunk_keys: Vec<String> = uploads
            .iter()
            .map(|u| {
                u.storage_key
                    .clone()
                    .unwrap_or_else(|| keys::chunk_key(file.id, u.chunk_number))
            })
            .collect();
        let expected_size: i64 = uploads.iter().filter_map(|u| u.size_bytes).sum();

        let storage = self.storage.clone();
        let parts = futures::stream::iter(chunk_keys)
            .then(move |key| {
                let storage = storage.clone();
                async move { storage.get_stream(&key).await }
            })
            .try_flatten();
        let reader: ByteReader = Box::pin(StreamReader::new(Box::pin(parts)));

        let written = match self.storage.put_stream(&temp_key, reader).await {
            Ok(written) => written as i64,
            Err(e) => {
                self.discard_temp(&temp_key).await;
                return Err(AppError::ReassemblyFailed(format!(
                    "Failed to write assembled file {}: {}",
                    file.id, e
                )));
            }
        };

        if written != expected_size {
            self.discard_temp(&temp_key).await;
            return Err(AppError::ReassemblyFailed(format!(
                "Assembled size {} bytes does not match {} bytes recorded for the chunks of file {}",
                written, expected_size, file.id
            )));
        }

        if let Err(e) = self.storage.rename(&temp_key, final_key).await {
            self.discard_temp(&temp_key).await;
            return Err(AppError::ReassemblyFailed(format!(
                "Failed to publish assembled file {}: {}",
                file.id, e
            )));
        }

        Ok(written)
    }

    async fn discard_temp(&self, temp_key: &str) {
        if let Err(e) = self.storage.delete(temp_key).await {
            tracing::warn!(
                error = %e,
                storage_key = %temp_key,
                "Failed to delete reassembly scratch blob"
            );
        }
    }
}
