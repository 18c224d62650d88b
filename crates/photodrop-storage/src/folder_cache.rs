//! Folder resolution cache
//!
//! Maps a sanitized logical name to the id of the remote folder holding that
//! thread's uploads. Live entries answer without a remote call; misses and
//! expired entries go to the backend under the storage retry policy.
//!
//! Locking:
//! - the entry map sits behind one `std::sync::Mutex` that is only held for
//!   map reads and writes, never across a remote call;
//! - `resolve_or_create` additionally holds a per-name async mutex across its
//!   resolve-then-create sequence, so two concurrent callers for the same
//!   name cannot both observe a miss and create duplicate folders.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use photodrop_core::naming::sanitize_folder_name;
use photodrop_core::{retry_with_backoff, RetryPolicy, RootFolder};
use tokio::time::Instant;

use crate::traits::DriveBackend;

/// How long a resolved folder id is trusted.
pub const FOLDER_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    folder_id: String,
    root_id: String,
    resolved_at: Instant,
}

pub struct FolderCache {
    backend: Arc<dyn DriveBackend>,
    root: RootFolder,
    policy: RetryPolicy,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    create_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FolderCache {
    pub fn new(backend: Arc<dyn DriveBackend>, root: RootFolder, policy: RetryPolicy) -> Self {
        Self {
            backend,
            root,
            policy,
            ttl: FOLDER_CACHE_TTL,
            entries: Mutex::new(HashMap::new()),
            create_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn root(&self) -> &RootFolder {
        &self.root
    }

    /// Look up the folder for `name`, querying the backend on a cache miss.
    ///
    /// Returns `None` when the folder does not exist or the query failed
    /// after retries.
    pub async fn resolve(&self, name: &str) -> Option<String> {
        let name = sanitize_folder_name(Some(name));
        self.resolve_sanitized(&name).await
    }

    /// Create the folder for `name` under the current root.
    ///
    /// Returns `None` when creation failed after retries.
    pub async fn create(&self, name: &str) -> Option<String> {
        let name = sanitize_folder_name(Some(name));
        self.create_sanitized(&name).await
    }

    /// Resolve the folder for `name`, creating it if it does not exist.
    pub async fn resolve_or_create(&self, name: &str) -> Option<String> {
        let name = sanitize_folder_name(Some(name));

        let lock = self.create_lock(&name);
        let result = {
            let _guard = lock.lock().await;
            match self.resolve_sanitized(&name).await {
                Some(id) => Some(id),
                None => {
                    tracing::info!(folder = %name, "Folder not found, creating");
                    self.create_sanitized(&name).await
                }
            }
        };
        self.release_create_lock(&name, lock);
        result
    }

    /// Drop every entry. Called when the root folder changes.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries();
        let dropped = entries.len();
        entries.clear();
        tracing::info!(dropped, "Folder cache cleared");
    }

    /// Number of entries currently held, live or expired.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn resolve_sanitized(&self, name: &str) -> Option<String> {
        let root_id = self.root.snapshot();
        if let Some(id) = self.cached(name, &root_id) {
            tracing::debug!(folder = %name, folder_id = %id, "Folder cache hit");
            return Some(id);
        }

        let backend = &self.backend;
        let root = root_id.as_str();
        let result = retry_with_backoff(&self.policy, "find_folder", || async move {
            backend
                .find_folder(root, name)
                .await
                .map_err(|e| e.into_retryable())
        })
        .await;

        match result {
            Ok(Some(id)) => {
                self.insert(name, &id, &root_id);
                Some(id)
            }
            Ok(None) => {
                tracing::debug!(folder = %name, "Folder not found");
                None
            }
            Err(e) => {
                tracing::error!(folder = %name, error = %e, "Failed to find folder");
                None
            }
        }
    }

    async fn create_sanitized(&self, name: &str) -> Option<String> {
        let root_id = self.root.snapshot();

        let backend = &self.backend;
        let root = root_id.as_str();
        let result = retry_with_backoff(&self.policy, "create_folder", || async move {
            backend
                .create_folder(root, name)
                .await
                .map_err(|e| e.into_retryable())
        })
        .await;

        match result {
            Ok(id) => {
                tracing::info!(folder = %name, folder_id = %id, "Folder created");
                self.insert(name, &id, &root_id);
                Some(id)
            }
            Err(e) => {
                tracing::error!(folder = %name, error = %e, "Failed to create folder");
                None
            }
        }
    }

    fn cached(&self, name: &str, root_id: &str) -> Option<String> {
        let entries = self.entries();
        entries
            .get(name)
            .filter(|e| e.root_id == root_id && e.resolved_at.elapsed() < self.ttl)
            .map(|e| e.folder_id.clone())
    }

    fn insert(&self, name: &str, folder_id: &str, root_id: &str) {
        self.entries().insert(
            name.to_string(),
            CacheEntry {
                folder_id: folder_id.to_string(),
                root_id: root_id.to_string(),
                resolved_at: Instant::now(),
            },
        );
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn create_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.create_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Forget the lock for `name` once no other caller holds or awaits it.
    fn release_create_lock(&self, name: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.create_locks.lock().unwrap_or_else(|p| p.into_inner());
        let idle = locks
            .get(name)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
        if idle {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    fn pending_create_locks(&self) -> usize {
        self.create_locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
