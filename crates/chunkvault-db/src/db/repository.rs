//! Record store traits
//!
//! The upload engine only talks to these traits, so it runs unchanged against
//! PostgreSQL or the in-memory store.

use async_trait::async_trait;
use chunkvault_core::models::{
    FileFilter, FileMetadata, FileRecord, FileStatus, NewFile, UploadRecord, UploadStatus,
    UploadTransition,
};
use chunkvault_core::AppError;
use uuid::Uuid;

use super::locks::FileLease;

/// Store for file metadata rows.
///
/// Reads and owner edits are scoped by `owner_id`; a file owned by someone else
/// behaves exactly like a missing one.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Insert a file together with `expected_chunk_count` pending upload records,
    /// atomically. Fails with `DuplicateName` if the owner already has a file with
    /// that name.
    async fn create_with_uploads(
        &self,
        new_file: NewFile,
    ) -> Result<(FileRecord, Vec<UploadRecord>), AppError>;

    async fn get(&self, owner_id: Uuid, file_id: Uuid) -> Result<Option<FileRecord>, AppError>;

    /// Owner's files ordered by name
    async fn list(&self, owner_id: Uuid, filter: &FileFilter)
        -> Result<Vec<FileRecord>, AppError>;

    /// Replace the editable metadata of a file that has not been assembled.
    ///
    /// Returns `None` when no such unassembled file exists. Fails with
    /// `DuplicateName` on a name collision.
    async fn update_metadata(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        metadata: &FileMetadata,
    ) -> Result<Option<FileRecord>, AppError>;

    /// Rewrite the mirrored status column
    async fn set_status(&self, file_id: Uuid, status: FileStatus) -> Result<(), AppError>;

    /// Publish the assembled blob and mark the file completed.
    ///
    /// Only the first call for a file succeeds; later calls return `false` and leave
    /// the row untouched.
    async fn mark_assembled(
        &self,
        file_id: Uuid,
        assembled_key: &str,
        size_bytes: i64,
    ) -> Result<bool, AppError>;

    /// Delete the file row; its upload records go with it.
    async fn delete(&self, owner_id: Uuid, file_id: Uuid) -> Result<bool, AppError>;

    /// Wait for exclusive access to `file_id` across every user of this store.
    ///
    /// The lease is held until dropped. It does not require the file to exist.
    async fn lock_file(&self, file_id: Uuid) -> Result<Box<dyn FileLease>, AppError>;
}

/// Store for per-chunk upload records.
#[async_trait]
pub trait UploadRepository: Send + Sync {
    /// All upload records of a file in ascending chunk-number order
    async fn list_for_file(&self, file_id: Uuid) -> Result<Vec<UploadRecord>, AppError>;

    /// Apply `transition` if the record's current status is one of `from`.
    ///
    /// Returns the updated record, or `None` when the record is missing or its
    /// status did not match.
    async fn transition(
        &self,
        file_id: Uuid,
        chunk_number: i32,
        from: &[UploadStatus],
        transition: &UploadTransition,
    ) -> Result<Option<UploadRecord>, AppError>;
}
