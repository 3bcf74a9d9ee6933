//! In-memory record store
//!
//! Implements both repository traits over a single lock, enforcing the same
//! uniqueness and cascade rules as the PostgreSQL schema.

use async_trait::async_trait;
use chrono::Utc;
use chunkvault_core::models::{
    FileFilter, FileMetadata, FileRecord, FileStatus, NewFile, UploadRecord, UploadStatus,
    UploadTransition,
};
use chunkvault_core::AppError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::locks::{FileLease, KeyedLocks};
use super::repository::{FileRepository, UploadRepository};

#[derive(Default)]
struct State {
    files: HashMap<Uuid, FileRecord>,
    uploads: HashMap<Uuid, BTreeMap<i32, UploadRecord>>,
}

impl State {
    fn name_taken(&self, owner_id: Uuid, name: &str, except: Option<Uuid>) -> bool {
        self.files
            .values()
            .any(|f| f.owner_id == owner_id && f.name == name && Some(f.id) != except)
    }

    fn owned_mut(&mut self, owner_id: Uuid, file_id: Uuid) -> Option<&mut FileRecord> {
        self.files
            .get_mut(&file_id)
            .filter(|f| f.owner_id == owner_id)
    }
}

/// Process-local store for files and uploads
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<State>>,
    leases: KeyedLocks,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upload records across all files
    pub async fn upload_count(&self) -> usize {
        self.state.lock().await.uploads.values().map(BTreeMap::len).sum()
    }

    pub async fn file_count(&self) -> usize {
        self.state.lock().await.files.len()
    }
}

#[async_trait]
impl FileRepository for InMemoryRecordStore {
    async fn create_with_uploads(
        &self,
        new_file: NewFile,
    ) -> Result<(FileRecord, Vec<UploadRecord>), AppError> {
        let mut state = self.state.lock().await;

        if state.name_taken(new_file.owner_id, &new_file.name, None) {
            return Err(AppError::DuplicateName(new_file.name));
        }

        let now = Utc::now();
        let file = FileRecord {
            id: Uuid::new_v4(),
            owner_id: new_file.owner_id,
            name: new_file.name,
            create_datetime: new_file.create_datetime,
            checksum: new_file.checksum,
            status: FileStatus::InProgress,
            expected_chunk_count: new_file.expected_chunk_count,
            assembled_key: None,
            size_bytes: None,
            created_at: now,
            updated_at: now,
        };

        let uploads: BTreeMap<i32, UploadRecord> = (1..=file.expected_chunk_count)
            .map(|n| (n, UploadRecord::pending(file.id, n, now)))
            .collect();
        let created = uploads.values().cloned().collect();

        state.uploads.insert(file.id, uploads);
        state.files.insert(file.id, file.clone());

        Ok((file, created))
    }

    async fn get(&self, owner_id: Uuid, file_id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .get(&file_id)
            .filter(|f| f.owner_id == owner_id)
            .cloned())
    }

    async fn list(
        &self,
        owner_id: Uuid,
        filter: &FileFilter,
    ) -> Result<Vec<FileRecord>, AppError> {
        let state = self.state.lock().await;
        let needle = filter.name_contains.as_ref().map(|s| s.to_lowercase());

        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.owner_id == owner_id)
            .filter(|f| match &needle {
                Some(needle) => f.name.to_lowercase().contains(needle),
                None => true,
            })
            .filter(|f| filter.status.map_or(true, |s| f.status == s))
            .cloned()
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(files
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn update_metadata(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        metadata: &FileMetadata,
    ) -> Result<Option<FileRecord>, AppError> {
        let mut state = self.state.lock().await;

        let editable = state
            .files
            .get(&file_id)
            .is_some_and(|f| f.owner_id == owner_id && !f.is_assembled());
        if !editable {
            return Ok(None);
        }
        if state.name_taken(owner_id, &metadata.name, Some(file_id)) {
            return Err(AppError::DuplicateName(metadata.name.clone()));
        }

        Ok(state.owned_mut(owner_id, file_id).map(|file| {
            file.name = metadata.name.clone();
            file.checksum = metadata.checksum.clone();
            file.create_datetime = metadata.create_datetime;
            file.updated_at = Utc::now();
            file.clone()
        }))
    }

    async fn set_status(&self, file_id: Uuid, status: FileStatus) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if let Some(file) = state.files.get_mut(&file_id) {
            if !file.is_assembled() && file.status != status {
                file.status = status;
                file.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_assembled(
        &self,
        file_id: Uuid,
        assembled_key: &str,
        size_bytes: i64,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        match state.files.get_mut(&file_id) {
            Some(file) if !file.is_assembled() => {
                file.assembled_key = Some(assembled_key.to_string());
                file.size_bytes = Some(size_bytes);
                file.status = FileStatus::Completed;
                file.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, owner_id: Uuid, file_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        if state.owned_mut(owner_id, file_id).is_none() {
            return Ok(false);
        }
        state.files.remove(&file_id);
        state.uploads.remove(&file_id);
        Ok(true)
    }

    async fn lock_file(&self, file_id: Uuid) -> Result<Box<dyn FileLease>, AppError> {
        Ok(Box::new(self.leases.acquire(file_id).await))
    }
}

#[async_trait]
impl UploadRepository for InMemoryRecordStore {
    async fn list_for_file(&self, file_id: Uuid) -> Result<Vec<UploadRecord>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .uploads
            .get(&file_id)
            .map(|uploads| uploads.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn transition(
        &self,
        file_id: Uuid,
        chunk_number: i32,
        from: &[UploadStatus],
        transition: &UploadTransition,
    ) -> Result<Option<UploadRecord>, AppError> {
        let mut state = self.state.lock().await;
        let record = state
            .uploads
            .get_mut(&file_id)
            .and_then(|uploads| uploads.get_mut(&chunk_number));

        match record {
            Some(record) if from.contains(&record.status) => {
                record.status = transition.to;
                record.storage_key = transition.storage_key.clone();
                record.size_bytes = transition.size_bytes;
                record.updated_at = Utc::now();
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }
}
