use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use super::status::FileStatus;
use super::upload::{UploadRecord, UploadStatus};

/// File metadata row.
///
/// `status` mirrors the derived status for read-only consumers (listing, search);
/// the engine always re-derives it from the upload records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct FileRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// User-supplied creation timestamp, distinct from `created_at`
    pub create_datetime: DateTime<Utc>,
    /// Opaque client-supplied integrity tag
    pub checksum: Option<String>,
    pub status: FileStatus,
    pub expected_chunk_count: i32,
    /// Blob store key of the assembled file, set once reassembly is published
    pub assembled_key: Option<String>,
    pub size_bytes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_assembled(&self) -> bool {
        self.assembled_key.is_some()
    }
}

/// Input for creating a file together with its placeholder uploads.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner_id: Uuid,
    pub name: String,
    pub create_datetime: DateTime<Utc>,
    pub checksum: Option<String>,
    pub expected_chunk_count: i32,
}

/// Owner-editable metadata, fully resolved (no "unchanged" markers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub checksum: Option<String>,
    pub create_datetime: DateTime<Utc>,
}

impl From<&FileRecord> for FileMetadata {
    fn from(file: &FileRecord) -> Self {
        FileMetadata {
            name: file.name.clone(),
            checksum: file.checksum.clone(),
            create_datetime: file.create_datetime,
        }
    }
}

/// Request DTO for declaring a new chunked upload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateFileRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "File name must be between 1 and 255 characters"
    ))]
    pub name: String,
    #[validate(range(min = 1, message = "A file needs at least one chunk"))]
    pub expected_chunk_count: i32,
    #[serde(default)]
    #[validate(length(max = 255, message = "Checksum must be at most 255 characters"))]
    pub checksum: Option<String>,
    /// Defaults to the time of the request
    #[serde(default)]
    pub create_datetime: Option<DateTime<Utc>>,
}

/// Request DTO for editing file metadata
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateFileRequest {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "File name must be between 1 and 255 characters"
    ))]
    pub name: Option<String>,
    /// `Some("")` clears the checksum
    #[serde(default)]
    #[validate(length(max = 255, message = "Checksum must be at most 255 characters"))]
    pub checksum: Option<String>,
    #[serde(default)]
    pub create_datetime: Option<DateTime<Utc>>,
}

impl UpdateFileRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.checksum.is_none() && self.create_datetime.is_none()
    }

    /// Apply this request on top of the current metadata.
    pub fn apply(&self, current: &FileMetadata) -> FileMetadata {
        FileMetadata {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            checksum: match self.checksum.as_deref() {
                None => current.checksum.clone(),
                Some("") => None,
                Some(value) => Some(value.to_string()),
            },
            create_datetime: self.create_datetime.unwrap_or(current.create_datetime),
        }
    }
}

/// Read-only filter for listing an owner's files
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FileFilter {
    #[serde(default)]
    pub name_contains: Option<String>,
    #[serde(default)]
    pub status: Option<FileStatus>,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000, message = "Limit must be between 1 and 1000"))]
    pub limit: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Offset must not be negative"))]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            name_contains: None,
            status: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// A file with its chunk slots and freshly derived status
#[derive(Debug, Clone, Serialize)]
pub struct FileDetails {
    #[serde(flatten)]
    pub file: FileRecord,
    /// Derived on read; overrides the mirrored `status` column
    pub derived_status: FileStatus,
    pub completed_chunks: i32,
    pub progress_percent: f64,
    pub uploads: Vec<UploadRecord>,
}

impl FileDetails {
    pub fn new(file: FileRecord, uploads: Vec<UploadRecord>) -> Self {
        let derived_status = FileStatus::derive(&uploads, file.is_assembled());
        let completed_chunks = uploads
            .iter()
            .filter(|u| u.status == UploadStatus::Completed)
            .count() as i32;
        let progress_percent = if file.expected_chunk_count > 0 {
            (completed_chunks as f64 / file.expected_chunk_count as f64) * 100.0
        } else {
            0.0
        };
        Self {
            file,
            derived_status,
            completed_chunks,
            progress_percent,
            uploads,
        }
    }

    /// Chunk numbers that still need a successful upload
    pub fn missing_chunks(&self) -> Vec<i32> {
        self.uploads
            .iter()
            .filter(|u| u.status != UploadStatus::Completed)
            .map(|u| u.chunk_number)
            .collect()
    }
}
