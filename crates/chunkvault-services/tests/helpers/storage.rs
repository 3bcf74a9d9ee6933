use async_trait::async_trait;
use chunkvault_services::{ByteStream, Storage, StorageBackend, StorageError, StorageResult};
use chunkvault_storage::traits::ByteReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Storage wrapper that records writes and injects faults
pub struct InstrumentedStorage {
    inner: Arc<dyn Storage>,
    writes: Mutex<Vec<String>>,
    fail_writes_containing: Mutex<Option<String>>,
    fail_delete_prefix: AtomicBool,
    delay_writes_containing: Mutex<Option<(String, Duration)>>,
}

impl InstrumentedStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
            fail_writes_containing: Mutex::new(None),
            fail_delete_prefix: AtomicBool::new(false),
            delay_writes_containing: Mutex::new(None),
        }
    }

    /// Make every write whose key contains `fragment` fail
    pub fn fail_writes_containing(&self, fragment: &str) {
        *self.fail_writes_containing.lock().unwrap() = Some(fragment.to_string());
    }

    /// Hold every write whose key contains `fragment` for `delay` before it starts
    pub fn delay_writes_containing(&self, fragment: &str, delay: Duration) {
        *self.delay_writes_containing.lock().unwrap() = Some((fragment.to_string(), delay));
    }

    pub fn fail_delete_prefix(&self, fail: bool) {
        self.fail_delete_prefix.store(fail, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        *self.fail_writes_containing.lock().unwrap() = None;
        self.fail_delete_prefix.store(false, Ordering::SeqCst);
        *self.delay_writes_containing.lock().unwrap() = None;
    }

    /// Keys of every attempted write, in order
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Number of assembled-file writes started
    pub fn assembly_writes(&self) -> usize {
        self.writes()
            .iter()
            .filter(|key| key.contains("/assembled.tmp-"))
            .count()
    }
}

#[async_trait]
impl Storage for InstrumentedStorage {
    async fn put_stream(&self, storage_key: &str, reader: ByteReader) -> StorageResult<u64> {
        self.writes.lock().unwrap().push(storage_key.to_string());

        let injected = self
            .fail_writes_containing
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|fragment| storage_key.contains(fragment));
        if injected {
            return Err(StorageError::UploadFailed(format!(
                "injected fault writing {}",
                storage_key
            )));
        }

        let delay = self
            .delay_writes_containing
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(fragment, _)| storage_key.contains(fragment.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.inner.put_stream(storage_key, reader).await
    }

    async fn get_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(storage_key).await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.inner.delete(storage_key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        if self.fail_delete_prefix.load(Ordering::SeqCst) {
            return Err(StorageError::DeleteFailed(format!(
                "injected fault deleting {}",
                prefix
            )));
        }
        self.inner.delete_prefix(prefix).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        self.inner.content_length(storage_key).await
    }

    async fn rename(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        self.inner.rename(from_key, to_key).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}
