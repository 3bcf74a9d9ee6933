//! Chunkvault Core Library
//!
//! This crate provides the domain models, status derivation, error types and
//! configuration shared by every chunkvault component.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, UploadLimits};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{FileStatus, UploadStatus};
pub use storage_types::StorageBackend;
