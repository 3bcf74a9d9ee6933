#![allow(dead_code)]

pub mod fixtures;
pub mod storage;

use chunkvault_core::models::{CreateFileRequest, FileDetails, UploadStatus};
use chunkvault_core::{AppError, UploadLimits};
use chunkvault_db::InMemoryRecordStore;
use chunkvault_services::{ChunkUploadOutcome, FileService, LocalStorage, MemoryStorage, Storage};
use chunkvault_storage::traits::ByteReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use storage::InstrumentedStorage;

/// Service under test with handles on its backing stores
pub struct TestService {
    pub service: FileService,
    pub records: InMemoryRecordStore,
    pub blobs: MemoryStorage,
    pub storage: Arc<InstrumentedStorage>,
}

/// Setup a service over in-memory records and blobs
pub fn setup_service() -> TestService {
    setup_service_with_limits(UploadLimits::default())
}

pub fn setup_service_with_limits(limits: UploadLimits) -> TestService {
    let records = InMemoryRecordStore::new();
    let blobs = MemoryStorage::new();
    let storage = Arc::new(InstrumentedStorage::new(Arc::new(blobs.clone())));

    let service = FileService::new(
        Arc::new(records.clone()),
        Arc::new(records.clone()),
        storage.clone(),
        limits,
    );

    TestService {
        service,
        records,
        blobs,
        storage,
    }
}

/// Two services over the same records and blobs, each with its own lock table,
/// standing in for two processes sharing a database and a storage backend
pub fn setup_shared_services() -> (FileService, FileService, TestService) {
    let shared = setup_service();
    let other = FileService::new(
        Arc::new(shared.records.clone()),
        Arc::new(shared.records.clone()),
        shared.storage.clone(),
        UploadLimits::default(),
    );
    (shared.service.clone(), other, shared)
}

/// Setup a service whose blobs live on the local filesystem under `dir`
pub async fn setup_local_service(dir: &Path) -> (FileService, InMemoryRecordStore) {
    let records = InMemoryRecordStore::new();
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(dir)
            .await
            .expect("Failed to create local storage"),
    );
    let service = FileService::new(
        Arc::new(records.clone()),
        Arc::new(records.clone()),
        storage,
        UploadLimits::default(),
    );
    (service, records)
}

pub fn payload(data: &[u8]) -> ByteReader {
    Box::pin(std::io::Cursor::new(data.to_vec()))
}

pub async fn create_file(
    service: &FileService,
    owner_id: Uuid,
    name: &str,
    expected_chunk_count: i32,
) -> FileDetails {
    service
        .create_file(
            owner_id,
            CreateFileRequest {
                name: name.to_string(),
                expected_chunk_count,
                checksum: None,
                create_datetime: None,
            },
        )
        .await
        .expect("Failed to create file")
}

pub async fn upload(
    service: &FileService,
    owner_id: Uuid,
    file_id: Uuid,
    chunk_number: i32,
    data: &[u8],
) -> Result<ChunkUploadOutcome, AppError> {
    service
        .upload_chunk(owner_id, file_id, chunk_number, payload(data))
        .await
}

/// Upload every chunk in the given order, returning the last outcome
pub async fn upload_in_order(
    service: &FileService,
    owner_id: Uuid,
    file_id: Uuid,
    chunks: &[Vec<u8>],
    order: &[usize],
) -> ChunkUploadOutcome {
    let mut last = None;
    for &index in order {
        let outcome = upload(service, owner_id, file_id, index as i32 + 1, &chunks[index])
            .await
            .expect("Chunk upload failed");
        last = Some(outcome);
    }
    last.expect("No chunks uploaded")
}

pub async fn download(service: &FileService, owner_id: Uuid, file_id: Uuid) -> Vec<u8> {
    use futures::TryStreamExt;

    let (_, mut stream) = service
        .open_file(owner_id, file_id)
        .await
        .expect("Failed to open file");
    let mut data = Vec::new();
    while let Some(piece) = stream.try_next().await.expect("Failed to read file") {
        data.extend_from_slice(&piece);
    }
    data
}

/// Poll until the chunk reports `status`
pub async fn wait_for_chunk_status(
    service: &FileService,
    owner_id: Uuid,
    file_id: Uuid,
    chunk_number: i32,
    status: UploadStatus,
) {
    for _ in 0..200 {
        let details = service
            .get_file(owner_id, file_id)
            .await
            .expect("Failed to get file");
        if details
            .uploads
            .iter()
            .any(|u| u.chunk_number == chunk_number && u.status == status)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Chunk {} never reached {}", chunk_number, status);
}
