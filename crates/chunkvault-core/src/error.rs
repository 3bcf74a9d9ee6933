//! Error types module
//!
//! All failures of the upload engine are unified under the `AppError` enum. Every
//! failure is scoped to a single file or chunk operation; nothing here is fatal to
//! the process.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.
//! With `default-features = false` the variant carries a plain message instead.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;
use uuid::Uuid;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for retryable faults
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
///
/// The request layer sits outside this workspace; this trait lets it map errors
/// to responses without matching on variants.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "CHUNK_OUT_OF_RANGE")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Chunk {chunk_number} is out of range (expected 1..={expected_chunk_count})")]
    ChunkOutOfRange {
        chunk_number: i32,
        expected_chunk_count: i32,
    },

    #[error("Chunk {chunk_number} of file {file_id} is already being uploaded")]
    ConcurrentUpload { file_id: Uuid, chunk_number: i32 },

    #[error("A file named '{0}' already exists")]
    DuplicateName(String),

    #[error("Storage I/O fault: {0}")]
    IoFault(String),

    #[error("Reassembly failed: {0}")]
    ReassemblyFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::IoFault(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the file ID and chunk number exist"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidState(_) => (
            409,
            "INVALID_STATE",
            false,
            Some("Check the file status before retrying"),
            false,
            LogLevel::Debug,
        ),
        AppError::ChunkOutOfRange { .. } => (
            400,
            "CHUNK_OUT_OF_RANGE",
            false,
            Some("Use a chunk number between 1 and the expected chunk count"),
            false,
            LogLevel::Debug,
        ),
        AppError::ConcurrentUpload { .. } => (
            409,
            "CONCURRENT_UPLOAD",
            true,
            Some("Wait for the in-flight upload of this chunk to finish"),
            false,
            LogLevel::Debug,
        ),
        AppError::DuplicateName(_) => (
            409,
            "DUPLICATE_NAME",
            false,
            Some("Choose a different file name"),
            false,
            LogLevel::Debug,
        ),
        AppError::IoFault(_) => (
            503,
            "STORAGE_IO_FAULT",
            true,
            Some("Retry the chunk upload"),
            true,
            LogLevel::Warn,
        ),
        AppError::ReassemblyFailed(_) => (
            503,
            "REASSEMBLY_FAILED",
            true,
            Some("Retry reassembly or re-upload any chunk"),
            true,
            LogLevel::Warn,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Split the file into smaller chunks"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::NotFound(_) => "NotFound",
            AppError::InvalidState(_) => "InvalidState",
            AppError::ChunkOutOfRange { .. } => "ChunkOutOfRange",
            AppError::ConcurrentUpload { .. } => "ConcurrentUpload",
            AppError::DuplicateName(_) => "DuplicateName",
            AppError::IoFault(_) => "IoFault",
            AppError::ReassemblyFailed(_) => "ReassemblyFailed",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::IoFault(_) => "Failed to access storage".to_string(),
            AppError::ReassemblyFailed(_) => {
                "File could not be assembled yet; it remains in progress".to_string()
            }
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            AppError::NotFound(ref msg)
            | AppError::InvalidState(ref msg)
            | AppError::InvalidInput(ref msg)
            | AppError::PayloadTooLarge(ref msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access database");
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_validation_class_errors_are_not_retryable() {
        let errors = [
            AppError::InvalidState("Cannot update completed file".to_string()),
            AppError::ChunkOutOfRange {
                chunk_number: 9,
                expected_chunk_count: 3,
            },
            AppError::DuplicateName("report.pdf".to_string()),
        ];
        for err in errors {
            assert!(!err.is_recoverable(), "{} should not be retryable", err);
            assert_eq!(err.log_level(), LogLevel::Debug);
        }
    }

    #[test]
    fn test_storage_faults_are_retryable() {
        let io = AppError::from(io::Error::other("disk gone"));
        assert!(matches!(io, AppError::IoFault(_)));
        assert!(io.is_recoverable());
        assert_eq!(io.client_message(), "Failed to access storage");

        let reassembly = AppError::ReassemblyFailed("chunk 2 missing".to_string());
        assert!(reassembly.is_recoverable());
        assert_eq!(reassembly.error_code(), "REASSEMBLY_FAILED");
    }

    #[test]
    fn test_chunk_out_of_range_message() {
        let err = AppError::ChunkOutOfRange {
            chunk_number: 0,
            expected_chunk_count: 4,
        };
        assert_eq!(err.http_status_code(), 400);
        assert!(err.client_message().contains("1..=4"));
    }

    #[test]
    fn test_invalid_state_keeps_message() {
        let err = AppError::InvalidState("Cannot update completed file".to_string());
        assert_eq!(err.client_message(), "Cannot update completed file");
        assert_eq!(err.error_type(), "InvalidState");
    }
}
