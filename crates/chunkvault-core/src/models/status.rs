//! File status aggregation.
//!
//! A file's status is never written by clients; it is derived from the statuses of
//! its upload records every time it is read.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::upload::{UploadRecord, UploadStatus};

/// Aggregate status of a file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "file_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    InProgress,
    Completed,
    Failed,
}

impl FileStatus {
    /// Derive a status from upload statuses alone.
    ///
    /// `completed` iff every record is completed; `failed` iff at least one record
    /// failed and none is in flight; `in_progress` otherwise. An empty set is
    /// `in_progress`.
    pub fn aggregate<I>(statuses: I) -> FileStatus
    where
        I: IntoIterator<Item = UploadStatus>,
    {
        let mut total = 0usize;
        let mut completed = 0usize;
        let mut any_failed = false;
        let mut any_in_progress = false;

        for status in statuses {
            total += 1;
            match status {
                UploadStatus::Completed => completed += 1,
                UploadStatus::Failed => any_failed = true,
                UploadStatus::InProgress => any_in_progress = true,
                UploadStatus::Pending => {}
            }
        }

        if total > 0 && completed == total {
            FileStatus::Completed
        } else if any_failed && !any_in_progress {
            FileStatus::Failed
        } else {
            FileStatus::InProgress
        }
    }

    /// Status of a file given its uploads and whether its assembled blob is published.
    ///
    /// All chunks completed but no assembled blob yet (reassembly pending or failed
    /// transiently) reads as `in_progress`: a file is never reported completed
    /// without its destination blob.
    pub fn derive(uploads: &[UploadRecord], assembled: bool) -> FileStatus {
        if assembled {
            return FileStatus::Completed;
        }
        match FileStatus::aggregate(uploads.iter().map(|u| u.status)) {
            FileStatus::Completed => FileStatus::InProgress,
            other => other,
        }
    }

    pub fn is_completed(self) -> bool {
        matches!(self, FileStatus::Completed)
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileStatus::InProgress => write!(f, "in_progress"),
            FileStatus::Completed => write!(f, "completed"),
            FileStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(FileStatus::InProgress),
            "completed" => Ok(FileStatus::Completed),
            "failed" => Ok(FileStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid file status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use UploadStatus::*;

    fn uploads(statuses: &[UploadStatus]) -> Vec<UploadRecord> {
        let file_id = Uuid::new_v4();
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut record = UploadRecord::pending(file_id, i as i32 + 1, Utc::now());
                record.status = *status;
                record
            })
            .collect()
    }

    #[test]
    fn test_all_completed_is_completed() {
        assert_eq!(
            FileStatus::aggregate([Completed, Completed, Completed]),
            FileStatus::Completed
        );
    }

    #[test]
    fn test_failed_without_in_flight_is_failed() {
        assert_eq!(
            FileStatus::aggregate([Completed, Failed, Pending]),
            FileStatus::Failed
        );
    }

    #[test]
    fn test_failed_with_in_flight_is_in_progress() {
        assert_eq!(
            FileStatus::aggregate([Failed, InProgress, Completed]),
            FileStatus::InProgress
        );
    }

    #[test]
    fn test_pending_is_in_progress() {
        assert_eq!(
            FileStatus::aggregate([Pending, Pending]),
            FileStatus::InProgress
        );
        assert_eq!(
            FileStatus::aggregate([Completed, Pending]),
            FileStatus::InProgress
        );
    }

    #[test]
    fn test_empty_set_is_in_progress() {
        assert_eq!(
            FileStatus::aggregate(std::iter::empty()),
            FileStatus::InProgress
        );
    }

    #[test]
    fn test_derive_waits_for_assembled_blob() {
        let records = uploads(&[Completed, Completed]);
        assert_eq!(FileStatus::derive(&records, false), FileStatus::InProgress);
        assert_eq!(FileStatus::derive(&records, true), FileStatus::Completed);
    }

    #[test]
    fn test_derive_passes_through_failed() {
        let records = uploads(&[Completed, Failed]);
        assert_eq!(FileStatus::derive(&records, false), FileStatus::Failed);
    }

    #[test]
    fn test_display_matches_column_values() {
        assert_eq!(FileStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            "completed".parse::<FileStatus>().unwrap(),
            FileStatus::Completed
        );
    }
}
