//! Database repositories for data access layer
//!
//! Repositories are split by table: `files` holds file metadata and the mirrored
//! aggregate status, `uploads` holds one row per chunk slot. Both tables are created
//! by the workspace migrations.
//
// Repository traits shared by every backend
pub mod locks;
pub mod repository;
//
// PostgreSQL implementations
pub mod files;
pub mod pool;
pub mod uploads;
//
// In-process implementation
pub mod memory;
//
// Transaction utilities
pub mod transaction;

pub use files::PgFileRepository;
pub use locks::{FileLease, KeyedGuard, KeyedLocks};
pub use memory::InMemoryRecordStore;
pub use pool::{connect, run_migrations};
pub use repository::{FileRepository, UploadRepository};
pub use transaction::with_transaction;
pub use uploads::PgUploadRepository;
