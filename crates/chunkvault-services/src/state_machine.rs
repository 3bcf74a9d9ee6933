//! Upload state machine
//!
//! Drives one chunk upload attempt: `pending | completed | failed -> in_progress`,
//! then `in_progress -> completed` on a durable write or `in_progress -> failed` on
//! a rejected payload or write fault. Status transitions run under the file lock;
//! the payload itself is streamed to the blob store without holding it, so chunks
//! of the same file upload in parallel.

use chunkvault_core::models::{FileRecord, FileStatus, UploadRecord, UploadStatus, UploadTransition};
use chunkvault_core::{AppError, UploadLimits};
use chunkvault_db::{FileRepository, UploadRepository};
use chunkvault_storage::traits::ByteReader;
use chunkvault_storage::{keys, Storage};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::locks::{FileLockGuard, FileLocks};
use crate::reassembly::{ReassemblyCoordinator, ReassemblyOutcome};

/// Outcome of a successful chunk upload
#[derive(Debug, Clone, Serialize)]
pub struct ChunkUploadOutcome {
    pub upload: UploadRecord,
    /// Derived file status after this chunk and any reassembly it triggered
    pub file_status: FileStatus,
    pub reassembly: ReassemblyOutcome,
}

#[derive(Clone)]
pub struct UploadStateMachine {
    files: Arc<dyn FileRepository>,
    uploads: Arc<dyn UploadRepository>,
    storage: Arc<dyn Storage>,
    locks: FileLocks,
    coordinator: ReassemblyCoordinator,
    limits: UploadLimits,
}

impl UploadStateMachine {
    pub fn new(
        files: Arc<dyn FileRepository>,
        uploads: Arc<dyn UploadRepository>,
        storage: Arc<dyn Storage>,
        locks: FileLocks,
        coordinator: ReassemblyCoordinator,
        limits: UploadLimits,
    ) -> Self {
        Self {
            files,
            uploads,
            storage,
            locks,
            coordinator,
            limits,
        }
    }

    /// Upload one chunk of a file owned by `owner_id`.
    ///
    /// On success the chunk is `completed` and, if it was the last missing one,
    /// the file has been reassembled. A `ReassemblyFailed` error means the chunk
    /// itself was stored but the file could not be assembled yet.
    #[tracing::instrument(skip(self, payload), fields(file_id = %file_id, chunk_number = chunk_number))]
    pub async fn begin_chunk_upload(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        chunk_number: i32,
        payload: ByteReader,
    ) -> Result<ChunkUploadOutcome, AppError> {
        self.start_attempt(owner_id, file_id, chunk_number).await?;

        let storage_key = keys::chunk_key(file_id, chunk_number);
        let start = Instant::now();

        let max = self.limits.max_chunk_size_bytes;
        let limited: ByteReader = Box::pin(payload.take(max.saturating_add(1)));

        let written = match self.storage.put_stream(&storage_key, limited).await {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(
                    file_id = %file_id,
                    chunk_number = chunk_number,
                    storage_key = %storage_key,
                    error = %e,
                    "Chunk write failed"
                );
                self.record_failure(file_id, chunk_number).await?;
                return Err(AppError::IoFault(format!(
                    "Failed to store chunk {} of file {}: {}",
                    chunk_number, file_id, e
                )));
            }
        };

        if written > max {
            if let Err(e) = self.storage.delete(&storage_key).await {
                tracing::warn!(
                    error = %e,
                    storage_key = %storage_key,
                    "Failed to delete rejected chunk payload"
                );
            }
            self.record_failure(file_id, chunk_number).await?;
            return Err(AppError::PayloadTooLarge(format!(
                "Chunk {} exceeds the maximum chunk size of {} bytes",
                chunk_number, max
            )));
        }

        let upload = self
            .record_success(file_id, chunk_number, &storage_key, written as i64)
            .await?;

        tracing::info!(
            file_id = %file_id,
            chunk_number = chunk_number,
            storage_key = %storage_key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Chunk upload completed"
        );

        let reassembly = self
            .coordinator
            .on_chunk_completed(owner_id, file_id)
            .await?;
        let file_status = match reassembly {
            ReassemblyOutcome::Incomplete { .. } => {
                let uploads = self.uploads.list_for_file(file_id).await?;
                FileStatus::derive(&uploads, false)
            }
            _ => FileStatus::Completed,
        };

        Ok(ChunkUploadOutcome {
            upload,
            file_status,
            reassembly,
        })
    }

    /// Validate the request and move the chunk to `in_progress`.
    async fn start_attempt(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        chunk_number: i32,
    ) -> Result<UploadRecord, AppError> {
        let guard = self.locks.acquire(file_id).await?;

        let file = self
            .files
            .get(owner_id, file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;

        let uploads = self.uploads.list_for_file(file_id).await?;
        if FileStatus::derive(&uploads, file.is_assembled()).is_completed() {
            return Err(AppError::InvalidState(format!(
                "File {} is completed; chunks can no longer be uploaded",
                file_id
            )));
        }

        if chunk_number < 1 || chunk_number > file.expected_chunk_count {
            return Err(AppError::ChunkOutOfRange {
                chunk_number,
                expected_chunk_count: file.expected_chunk_count,
            });
        }

        let current = uploads
            .iter()
            .find(|u| u.chunk_number == chunk_number)
            .ok_or_else(|| {
                AppError::NotFound(format!("Chunk {} of file {}", chunk_number, file_id))
            })?;

        if !current.status.accepts_new_attempt() {
            return Err(AppError::ConcurrentUpload {
                file_id,
                chunk_number,
            });
        }

        let started = self
            .uploads
            .transition(
                file_id,
                chunk_number,
                &UploadStatus::RESTARTABLE,
                &UploadTransition::begin(),
            )
            .await?
            .ok_or(AppError::ConcurrentUpload {
                file_id,
                chunk_number,
            })?;

        if current.status == UploadStatus::Completed {
            tracing::info!(
                file_id = %file_id,
                chunk_number = chunk_number,
                "Overwriting previously completed chunk"
            );
        }

        self.refresh_status(&guard, &file).await?;
        Ok(started)
    }

    async fn record_success(
        &self,
        file_id: Uuid,
        chunk_number: i32,
        storage_key: &str,
        size_bytes: i64,
    ) -> Result<UploadRecord, AppError> {
        let guard = self.locks.acquire(file_id).await?;

        let completed = self
            .uploads
            .transition(
                file_id,
                chunk_number,
                &[UploadStatus::InProgress],
                &UploadTransition::completed(storage_key.to_string(), size_bytes),
            )
            .await?;

        match completed {
            Some(upload) => {
                self.refresh_status_by_id(&guard).await?;
                Ok(upload)
            }
            None => {
                // The file was deleted while the payload was being written
                if let Err(e) = self.storage.delete(storage_key).await {
                    tracing::warn!(
                        error = %e,
                        storage_key = %storage_key,
                        "Failed to delete orphaned chunk payload"
                    );
                }
                Err(AppError::NotFound(format!(
                    "File {} was deleted during the upload of chunk {}",
                    file_id, chunk_number
                )))
            }
        }
    }

    async fn record_failure(&self, file_id: Uuid, chunk_number: i32) -> Result<(), AppError> {
        let guard = self.locks.acquire(file_id).await?;

        let failed = self
            .uploads
            .transition(
                file_id,
                chunk_number,
                &[UploadStatus::InProgress],
                &UploadTransition::failed(),
            )
            .await?;

        if failed.is_some() {
            self.refresh_status_by_id(&guard).await?;
        }
        Ok(())
    }

    async fn refresh_status(&self, guard: &FileLockGuard, file: &FileRecord) -> Result<(), AppError> {
        let uploads = self.uploads.list_for_file(guard.file_id()).await?;
        let status = FileStatus::derive(&uploads, file.is_assembled());
        if status != file.status {
            self.files.set_status(guard.file_id(), status).await?;
        }
        Ok(())
    }

    async fn refresh_status_by_id(&self, guard: &FileLockGuard) -> Result<(), AppError> {
        let uploads = self.uploads.list_for_file(guard.file_id()).await?;
        self.files
            .set_status(guard.file_id(), FileStatus::derive(&uploads, false))
            .await
    }
}
