//! In-memory [`DriveBackend`] for tests.
//!
//! Folders and uploaded files live in maps; every call is counted and
//! failures can be injected per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use photodrop_core::ApiError;

use crate::traits::{DriveBackend, StorageError, StorageResult, UploadBody, UploadRequest};

/// A file captured by [`MockDriveBackend::upload_file`].
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
    /// True if the body was handed over as a path rather than bytes.
    pub from_path: bool,
}

#[derive(Default)]
struct State {
    /// (parent_id, name) -> folder id
    folders: HashMap<(String, String), String>,
    uploads: Vec<StoredUpload>,
}

#[derive(Default)]
pub struct MockDriveBackend {
    state: Mutex<State>,
    next_id: AtomicUsize,
    latency: Option<Duration>,
    find_calls: AtomicU32,
    create_calls: AtomicU32,
    upload_calls: AtomicU32,
    fail_finds: AtomicU32,
    fail_creates: AtomicU32,
    fail_uploads: AtomicU32,
}

impl MockDriveBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register an existing folder and return its id.
    pub fn seed_folder(&self, parent_id: &str, name: &str) -> String {
        let id = self.fresh_id("folder");
        self.state
            .lock()
            .unwrap()
            .folders
            .insert((parent_id.to_string(), name.to_string()), id.clone());
        id
    }

    /// Make the next `n` `find_folder` calls fail with a transient error.
    pub fn fail_next_finds(&self, n: u32) {
        self.fail_finds.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `create_folder` calls fail with a transient error.
    pub fn fail_next_creates(&self, n: u32) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `upload_file` calls fail with a transient error.
    pub fn fail_next_uploads(&self, n: u32) {
        self.fail_uploads.store(n, Ordering::SeqCst);
    }

    pub fn find_calls(&self) -> u32 {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn folder_count(&self) -> usize {
        self.state.lock().unwrap().folders.len()
    }

    pub fn uploads(&self) -> Vec<StoredUpload> {
        self.state.lock().unwrap().uploads.clone()
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_failure(counter: &AtomicU32) -> StorageResult<()> {
        let injected = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(StorageError::Api(ApiError::new(
                "drive",
                503,
                "Service Unavailable",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DriveBackend for MockDriveBackend {
    async fn find_folder(&self, parent_id: &str, name: &str) -> StorageResult<Option<String>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Self::take_failure(&self.fail_finds)?;

        let state = self.state.lock().unwrap();
        Ok(state
            .folders
            .get(&(parent_id.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> StorageResult<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Self::take_failure(&self.fail_creates)?;

        let id = self.fresh_id("folder");
        self.state
            .lock()
            .unwrap()
            .folders
            .insert((parent_id.to_string(), name.to_string()), id.clone());
        Ok(id)
    }

    async fn folder_exists(&self, folder_id: &str) -> StorageResult<bool> {
        self.pause().await;
        let state = self.state.lock().unwrap();
        Ok(state.folders.values().any(|id| id == folder_id))
    }

    async fn upload_file(&self, request: UploadRequest) -> StorageResult<String> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Self::take_failure(&self.fail_uploads)?;

        let (data, from_path) = match &request.body {
            UploadBody::Bytes(bytes) => (bytes.clone(), false),
            UploadBody::Path(path) => (Bytes::from(tokio::fs::read(path).await?), true),
        };

        let id = self.fresh_id("file");
        self.state.lock().unwrap().uploads.push(StoredUpload {
            id: id.clone(),
            parent_id: request.parent_id,
            name: request.name,
            mime_type: request.mime_type,
            data,
            from_path,
        });
        Ok(id)
    }
}
