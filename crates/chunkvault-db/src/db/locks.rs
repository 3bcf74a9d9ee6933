//! Per-file leases
//!
//! A `FileLease` grants exclusive access to one file's records until it is
//! dropped. Every decision that depends on a file's aggregate state is taken while
//! holding one. `KeyedLocks` is the process-local table backing the in-memory
//! store's leases; entries are dropped once nobody holds or waits for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Exclusive hold on one file, released on drop
pub trait FileLease: Send {}

type LockTable = HashMap<Uuid, Arc<AsyncMutex<()>>>;

#[derive(Clone, Default)]
pub struct KeyedLocks {
    table: Arc<Mutex<LockTable>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `file_id`.
    pub async fn acquire(&self, file_id: Uuid) -> KeyedGuard {
        let lock = self.table().entry(file_id).or_default().clone();
        let guard = lock.lock_owned().await;

        KeyedGuard {
            file_id,
            guard: Some(guard),
            locks: self.clone(),
        }
    }

    /// Number of files with a live lock entry
    pub fn active(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        // The table holds no invariants a panicking holder could break
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct KeyedGuard {
    file_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: KeyedLocks,
}

impl KeyedGuard {
    pub fn file_id(&self) -> Uuid {
        self.file_id
    }
}

impl FileLease for KeyedGuard {}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        let mut table = self.locks.table();
        drop(self.guard.take());

        // Waiters hold their own clone of the Arc, so a count of one means the
        // table is the last owner.
        if table
            .get(&self.file_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.file_id);
        }
    }
}
