use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Status of a single chunk upload.
///
/// Legal transitions:
///
/// ```text
/// pending   -> in_progress
/// in_progress -> completed | failed
/// completed -> in_progress   (retry overwrites the payload)
/// failed    -> in_progress
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "upload_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Placeholder created with the file, no payload yet
    Pending,
    /// Payload is being written to the blob store
    InProgress,
    /// Payload durably stored
    Completed,
    /// Payload rejected or write fault
    Failed,
}

impl UploadStatus {
    /// Whether a new upload attempt may start from this status.
    ///
    /// Everything except an in-flight write accepts a new attempt; a completed
    /// chunk is overwritten (last write wins).
    pub fn accepts_new_attempt(self) -> bool {
        !matches!(self, UploadStatus::InProgress)
    }

    /// Statuses from which a new attempt may start.
    pub const RESTARTABLE: [UploadStatus; 3] = [
        UploadStatus::Pending,
        UploadStatus::Completed,
        UploadStatus::Failed,
    ];

    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        match (self, next) {
            (UploadStatus::InProgress, UploadStatus::Completed)
            | (UploadStatus::InProgress, UploadStatus::Failed) => true,
            (from, UploadStatus::InProgress) => from.accepts_new_attempt(),
            _ => false,
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::InProgress => write!(f, "in_progress"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "in_progress" => Ok(UploadStatus::InProgress),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// One chunk slot of a file. Created in bulk with the file and overwritten by each
/// upload attempt of the same chunk number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct UploadRecord {
    pub id: Uuid,
    pub file_id: Uuid,
    /// 1-based, unique within the file
    pub chunk_number: i32,
    pub status: UploadStatus,
    /// Blob store key of the stored payload, set on completion
    pub storage_key: Option<String>,
    pub size_bytes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn pending(file_id: Uuid, chunk_number: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_id,
            chunk_number,
            status: UploadStatus::Pending,
            storage_key: None,
            size_bytes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome written by an upload transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTransition {
    pub to: UploadStatus,
    pub storage_key: Option<String>,
    pub size_bytes: Option<i64>,
}

impl UploadTransition {
    pub fn begin() -> Self {
        Self {
            to: UploadStatus::InProgress,
            storage_key: None,
            size_bytes: None,
        }
    }

    pub fn completed(storage_key: String, size_bytes: i64) -> Self {
        Self {
            to: UploadStatus::Completed,
            storage_key: Some(storage_key),
            size_bytes: Some(size_bytes),
        }
    }

    pub fn failed() -> Self {
        Self {
            to: UploadStatus::Failed,
            storage_key: None,
            size_bytes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use UploadStatus::*;

        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(Failed.can_transition_to(InProgress));
        assert!(Completed.can_transition_to(InProgress));
    }

    #[test]
    fn test_illegal_transitions() {
        use UploadStatus::*;

        assert!(!InProgress.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_status_round_trips_through_display() {
        for status in [
            UploadStatus::Pending,
            UploadStatus::InProgress,
            UploadStatus::Completed,
            UploadStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<UploadStatus>().unwrap(), status);
        }
        assert!("done".parse::<UploadStatus>().is_err());
    }

    #[test]
    fn test_restartable_matches_accepts_new_attempt() {
        for status in UploadStatus::RESTARTABLE {
            assert!(status.accepts_new_attempt());
        }
        assert!(!UploadStatus::InProgress.accepts_new_attempt());
    }
}
