//! Chunkvault record stores
//!
//! File and upload records live behind the `FileRepository` and `UploadRepository`
//! traits. `PgFileRepository` / `PgUploadRepository` persist them in PostgreSQL;
//! `InMemoryRecordStore` keeps them in process for tests and for the memory
//! backend.

pub mod db;

pub use db::{
    connect, run_migrations, with_transaction, FileLease, FileRepository, InMemoryRecordStore,
    KeyedGuard, KeyedLocks, PgFileRepository, PgUploadRepository, UploadRepository,
};
