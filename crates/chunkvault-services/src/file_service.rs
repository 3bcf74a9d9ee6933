//! File lifecycle service
//!
//! The facade request handlers talk to. Every operation is scoped to an owner; a
//! file owned by someone else is reported as `NotFound`.

use chrono::Utc;
use chunkvault_core::models::{
    CreateFileRequest, FileDetails, FileFilter, FileMetadata, FileRecord, NewFile,
    UpdateFileRequest,
};
use chunkvault_core::{AppError, UploadLimits};
use chunkvault_db::{FileRepository, UploadRepository};
use chunkvault_storage::traits::{ByteReader, ByteStream};
use chunkvault_storage::{keys, Storage};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::locks::FileLocks;
use crate::reassembly::{ReassemblyCoordinator, ReassemblyOutcome};
use crate::state_machine::{ChunkUploadOutcome, UploadStateMachine};

#[derive(Clone)]
pub struct FileService {
    files: Arc<dyn FileRepository>,
    uploads: Arc<dyn UploadRepository>,
    storage: Arc<dyn Storage>,
    locks: FileLocks,
    coordinator: ReassemblyCoordinator,
    state_machine: UploadStateMachine,
    limits: UploadLimits,
}

impl FileService {
    pub fn new(
        files: Arc<dyn FileRepository>,
        uploads: Arc<dyn UploadRepository>,
        storage: Arc<dyn Storage>,
        limits: UploadLimits,
    ) -> Self {
        let locks = FileLocks::new(files.clone());
        let coordinator = ReassemblyCoordinator::new(
            files.clone(),
            uploads.clone(),
            storage.clone(),
            locks.clone(),
        );
        let state_machine = UploadStateMachine::new(
            files.clone(),
            uploads.clone(),
            storage.clone(),
            locks.clone(),
            coordinator.clone(),
            limits.clone(),
        );

        Self {
            files,
            uploads,
            storage,
            locks,
            coordinator,
            state_machine,
            limits,
        }
    }

    /// Declare a new file; creates one pending upload per expected chunk.
    #[tracing::instrument(skip(self, request), fields(owner_id = %owner_id))]
    pub async fn create_file(
        &self,
        owner_id: Uuid,
        request: CreateFileRequest,
    ) -> Result<FileDetails, AppError> {
        request.validate()?;
        if request.expected_chunk_count > self.limits.max_chunk_count {
            return Err(AppError::InvalidInput(format!(
                "Chunk count {} exceeds maximum {}",
                request.expected_chunk_count, self.limits.max_chunk_count
            )));
        }

        let (file, uploads) = self
            .files
            .create_with_uploads(NewFile {
                owner_id,
                name: request.name,
                create_datetime: request.create_datetime.unwrap_or_else(Utc::now),
                checksum: request.checksum.filter(|c| !c.is_empty()),
                expected_chunk_count: request.expected_chunk_count,
            })
            .await?;

        tracing::info!(
            file_id = %file.id,
            expected_chunk_count = file.expected_chunk_count,
            "File created"
        );

        Ok(FileDetails::new(file, uploads))
    }

    pub async fn get_file(&self, owner_id: Uuid, file_id: Uuid) -> Result<FileDetails, AppError> {
        let file = self.require_file(owner_id, file_id).await?;
        let uploads = self.uploads.list_for_file(file_id).await?;
        Ok(FileDetails::new(file, uploads))
    }

    pub async fn list_files(
        &self,
        owner_id: Uuid,
        filter: &FileFilter,
    ) -> Result<Vec<FileRecord>, AppError> {
        filter.validate()?;
        self.files.list(owner_id, filter).await
    }

    /// Edit name, checksum or creation timestamp of a file that is not completed.
    #[tracing::instrument(skip(self, request), fields(file_id = %file_id))]
    pub async fn update_file(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        request: UpdateFileRequest,
    ) -> Result<FileDetails, AppError> {
        request.validate()?;
        let _guard = self.locks.acquire(file_id).await?;

        let details = self.get_file(owner_id, file_id).await?;
        if details.derived_status.is_completed() {
            return Err(AppError::InvalidState(
                "Cannot update completed file".to_string(),
            ));
        }
        if request.is_empty() {
            return Ok(details);
        }

        let metadata = request.apply(&FileMetadata::from(&details.file));
        let file = self
            .files
            .update_metadata(owner_id, file_id, &metadata)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;

        Ok(FileDetails::new(file, details.uploads))
    }

    /// Delete a file in any state with all of its blobs and records.
    #[tracing::instrument(skip(self), fields(file_id = %file_id))]
    pub async fn delete_file(&self, owner_id: Uuid, file_id: Uuid) -> Result<(), AppError> {
        let _guard = self.locks.acquire(file_id).await?;
        self.require_file(owner_id, file_id).await?;

        // Blobs first: if this fails the records remain and the delete can be retried
        self.storage
            .delete_prefix(&keys::file_prefix(file_id))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, file_id = %file_id, "Failed to delete file blobs");
                AppError::from(e)
            })?;

        if !self.files.delete(owner_id, file_id).await? {
            return Err(AppError::NotFound(format!("File {}", file_id)));
        }

        tracing::info!(file_id = %file_id, "File deleted");
        Ok(())
    }

    pub async fn upload_chunk(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        chunk_number: i32,
        payload: ByteReader,
    ) -> Result<ChunkUploadOutcome, AppError> {
        self.state_machine
            .begin_chunk_upload(owner_id, file_id, chunk_number, payload)
            .await
    }

    /// Re-run reassembly for a file whose chunks are all completed.
    ///
    /// A completed file is left untouched.
    #[tracing::instrument(skip(self), fields(file_id = %file_id))]
    pub async fn retry_reassembly(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
    ) -> Result<ReassemblyOutcome, AppError> {
        let guard = self.locks.acquire(file_id).await?;
        match self.coordinator.reassemble_locked(&guard, owner_id).await? {
            ReassemblyOutcome::Incomplete { missing_chunks } => Err(AppError::InvalidState(
                format!(
                    "File {} cannot be assembled; chunks not completed: {:?}",
                    file_id, missing_chunks
                ),
            )),
            outcome => Ok(outcome),
        }
    }

    /// Stream the assembled content of a completed file.
    pub async fn open_file(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
    ) -> Result<(FileRecord, ByteStream), AppError> {
        let file = self.require_file(owner_id, file_id).await?;
        let key = file.assembled_key.clone().ok_or_else(|| {
            AppError::InvalidState(format!("File {} is not completed", file_id))
        })?;
        let stream = self.storage.get_stream(&key).await?;
        Ok((file, stream))
    }

    async fn require_file(&self, owner_id: Uuid, file_id: Uuid) -> Result<FileRecord, AppError> {
        self.files
            .get(owner_id, file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))
    }
}
