//! Chunkvault Services Layer
//!
//! This crate is the **upload engine**: the per-chunk state machine, the reassembly
//! coordinator and the file lifecycle facade built on top of them. Persistence and
//! blob storage come in through the `chunkvault-db` and `chunkvault-storage`
//! traits, so the same engine runs against PostgreSQL or in-memory stores.

pub mod file_service;
pub mod locks;
pub mod reassembly;
pub mod state_machine;

pub use chunkvault_storage::{
    create_storage, ByteStream, LocalStorage, MemoryStorage, Storage, StorageBackend,
    StorageError, StorageResult,
};
pub use file_service::FileService;
pub use locks::{FileLockGuard, FileLocks};
pub use reassembly::{ReassemblyCoordinator, ReassemblyOutcome};
pub use state_machine::{ChunkUploadOutcome, UploadStateMachine};
