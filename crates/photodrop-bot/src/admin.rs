//! Runtime change of the root upload folder.

use std::sync::{Arc, LazyLock};

use photodrop_core::{retry_with_backoff, AppError, RetryPolicy, RootFolderStore};
use photodrop_storage::{DriveBackend, FolderCache};
use regex::Regex;

/// Drive file ids are URL-safe base64-like tokens.
static FOLDER_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex is valid"));

pub fn is_valid_folder_id(folder_id: &str) -> bool {
    FOLDER_ID_PATTERN.is_match(folder_id)
}

#[derive(Debug, thiserror::Error)]
pub enum ChangeFolderError {
    #[error("'{0}' is not a valid folder ID")]
    InvalidId(String),

    #[error("Folder {0} was not found or is not a folder")]
    NotAFolder(String),

    #[error("Could not verify folder {id}: {source:#}")]
    Backend {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Folder changed to {id} but the change could not be saved: {source}")]
    Persist {
        id: String,
        #[source]
        source: AppError,
    },
}

pub struct RootFolderAdmin {
    backend: Arc<dyn DriveBackend>,
    folders: Arc<FolderCache>,
    store: RootFolderStore,
    policy: RetryPolicy,
}

impl RootFolderAdmin {
    pub fn new(
        backend: Arc<dyn DriveBackend>,
        folders: Arc<FolderCache>,
        store: RootFolderStore,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            folders,
            store,
            policy,
        }
    }

    pub fn current(&self) -> String {
        self.folders.root().snapshot()
    }

    /// Validate `folder_id` with the backend, swap it in, clear the folder
    /// cache and persist it. Returns the previous root id.
    pub async fn change_root_folder(&self, folder_id: &str) -> Result<String, ChangeFolderError> {
        if !is_valid_folder_id(folder_id) {
            return Err(ChangeFolderError::InvalidId(folder_id.to_string()));
        }

        let backend = &self.backend;
        let exists = retry_with_backoff(&self.policy, "folder_exists", || async move {
            backend
                .folder_exists(folder_id)
                .await
                .map_err(|e| e.into_retryable())
        })
        .await
        .map_err(|source| ChangeFolderError::Backend {
            id: folder_id.to_string(),
            source,
        })?;
        if !exists {
            return Err(ChangeFolderError::NotAFolder(folder_id.to_string()));
        }

        let previous = self.folders.root().replace(folder_id);
        self.folders.invalidate_all();
        tracing::info!(previous = %previous, current = folder_id, "Root folder changed");

        self.store
            .save(folder_id)
            .await
            .map_err(|source| ChangeFolderError::Persist {
                id: folder_id.to_string(),
                source,
            })?;
        Ok(previous)
    }
}
