//! Storage abstraction trait
//!
//! This module defines the [`DriveBackend`] trait that remote folder storage
//! implementations must implement, plus the upload request types.

use async_trait::async_trait;
use bytes::Bytes;
use photodrop_core::{ApiError, AppError};
use std::path::PathBuf;
use thiserror::Error;

/// MIME type Google Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Network(msg) => AppError::Network(msg),
            StorageError::Api(api) => AppError::Api(api),
            StorageError::Auth(msg) => AppError::Forbidden(msg),
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::InvalidResponse(msg) => AppError::Internal(msg),
            StorageError::IoError(e) => AppError::Io(e),
            StorageError::ConfigError(msg) => AppError::Config(msg),
        }
    }
}

impl StorageError {
    /// Convert into an `anyhow::Error` the retry engine can classify.
    pub fn into_retryable(self) -> anyhow::Error {
        anyhow::Error::new(AppError::from(self))
    }
}

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
pub enum UploadBody {
    Bytes(Bytes),
    Path(PathBuf),
}

impl UploadBody {
    /// Build a body from an optional in-memory buffer and an optional path.
    ///
    /// The buffer wins when both are present.
    pub fn from_parts(bytes: Option<Bytes>, path: Option<PathBuf>) -> Result<Self, AppError> {
        match (bytes, path) {
            (Some(bytes), _) => Ok(UploadBody::Bytes(bytes)),
            (None, Some(path)) => Ok(UploadBody::Path(path)),
            (None, None) => Err(AppError::MissingUploadBody),
        }
    }

    /// Size of the body if it can be known without reading it.
    pub async fn len(&self) -> StorageResult<u64> {
        match self {
            UploadBody::Bytes(bytes) => Ok(bytes.len() as u64),
            UploadBody::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }
}

/// A single file upload into a remote folder.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub parent_id: String,
    pub name: String,
    pub mime_type: String,
    pub body: UploadBody,
}

/// Remote folder storage.
///
/// Implementations make exactly one remote attempt per call; retrying is the
/// caller's job.
#[async_trait]
pub trait DriveBackend: Send + Sync {
    /// Id of the first folder named `name` directly under `parent_id`.
    async fn find_folder(&self, parent_id: &str, name: &str) -> StorageResult<Option<String>>;

    /// Create a folder named `name` under `parent_id` and return its id.
    async fn create_folder(&self, parent_id: &str, name: &str) -> StorageResult<String>;

    /// True if `folder_id` names an existing, non-trashed folder.
    async fn folder_exists(&self, folder_id: &str) -> StorageResult<bool>;

    /// Upload a file and return its remote id.
    async fn upload_file(&self, request: UploadRequest) -> StorageResult<String>;
}
