//! Per-file exclusive locks.
//!
//! Every decision that depends on a file's aggregate state (starting a chunk
//! attempt, recording its outcome, reassembly, metadata edits, deletion) runs while
//! holding that file's lock. A lock is a lease from the record store, so it
//! excludes every process sharing the store. Callers in the same process queue on
//! a local mutex first and hold at most one lease per file between them.

use chunkvault_core::AppError;
use chunkvault_db::{FileLease, FileRepository, KeyedGuard, KeyedLocks};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Clone)]
pub struct FileLocks {
    local: KeyedLocks,
    files: Arc<dyn FileRepository>,
}

impl FileLocks {
    pub fn new(files: Arc<dyn FileRepository>) -> Self {
        Self {
            local: KeyedLocks::new(),
            files,
        }
    }

    /// Wait for exclusive access to `file_id`.
    pub async fn acquire(&self, file_id: Uuid) -> Result<FileLockGuard, AppError> {
        let local = self.local.acquire(file_id).await;
        let lease = self.files.lock_file(file_id).await?;

        Ok(FileLockGuard {
            _lease: Mutex::new(lease),
            local,
        })
    }

    /// Number of files with a live lock in this process
    pub fn active(&self) -> usize {
        self.local.active()
    }
}

/// Held while a file is locked; releases on drop.
pub struct FileLockGuard {
    // Dropped before `local`; the mutex keeps the guard Sync
    _lease: Mutex<Box<dyn FileLease>>,
    local: KeyedGuard,
}

impl FileLockGuard {
    pub fn file_id(&self) -> Uuid {
        self.local.file_id()
    }
}
