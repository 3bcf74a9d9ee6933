//! Chunkvault Storage Library
//!
//! This crate provides the blob store abstraction used by the upload engine, with
//! implementations for the local filesystem and process memory.
//!
//! # Storage key format
//!
//! Every blob belonging to a file lives under `files/{file_id}/`:
//!
//! - **Chunk payloads**: `files/{file_id}/chunks/{chunk_number}`
//! - **Assembled file**: `files/{file_id}/assembled`
//! - **Reassembly scratch**: `files/{file_id}/assembled.tmp-{attempt_id}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use chunkvault_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
