//! The process-wide root folder id.
//!
//! Every per-thread folder is created under this id. It can be changed at
//! runtime by an administrator, so it lives in a shared cell rather than in
//! [`Config`](crate::Config). Readers take a snapshot at the start of an
//! operation and use it throughout.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Shared, runtime-mutable root folder id.
#[derive(Debug, Clone)]
pub struct RootFolder {
    inner: Arc<RwLock<String>>,
}

impl RootFolder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(id.into())),
        }
    }

    /// Current root folder id.
    pub fn snapshot(&self) -> String {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the root folder id, returning the previous one.
    pub fn replace(&self, id: impl Into<String>) -> String {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, id.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootFolderState {
    pub parent_folder_id: String,
    pub updated_at: DateTime<Utc>,
}

/// JSON file holding the last root folder chosen at runtime.
#[derive(Debug, Clone)]
pub struct RootFolderStore {
    path: PathBuf,
}

impl RootFolderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<RootFolderState>, AppError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Persist `folder_id` with the current timestamp.
    ///
    /// Writes to a sibling temp file and renames it over the target so a
    /// crash never leaves a truncated state file.
    pub async fn save(&self, folder_id: &str) -> Result<RootFolderState, AppError> {
        let state = RootFolderState {
            parent_folder_id: folder_id.to_string(),
            updated_at: Utc::now(),
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let json = serde_json::to_vec_pretty(&state)
            .map_err(|e| AppError::Internal(format!("Failed to serialize state: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), folder_id, "Root folder state saved");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_returns_previous_and_updates_snapshot() {
        let root = RootFolder::new("a");
        let handle = root.clone();
        assert_eq!(root.replace("b"), "a");
        assert_eq!(handle.snapshot(), "b");
    }

    #[tokio::test]
    async fn missing_state_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RootFolderStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = RootFolderStore::new(dir.path().join("nested").join("state.json"));

        let saved = store.save("folder-123").await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.parent_folder_id, "folder-123");
    }

    #[tokio::test]
    async fn corrupt_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(RootFolderStore::new(path).load().await.is_err());
    }
}
