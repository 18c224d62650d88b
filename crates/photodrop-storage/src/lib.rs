//! Photodrop Storage Library
//!
//! This crate provides the remote folder storage abstraction for photodrop:
//! the [`DriveBackend`] trait, the Google Drive implementation with
//! service-account authentication, and the [`FolderCache`] that maps thread
//! names to remote folder ids.

#[cfg(feature = "google-drive")]
pub mod auth;
pub mod folder_cache;
#[cfg(feature = "google-drive")]
pub mod google_drive;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "google-drive")]
pub use auth::{AccessTokenSource, ServiceAccountAuth, ServiceAccountKey, StaticToken};
pub use folder_cache::{FolderCache, FOLDER_CACHE_TTL};
#[cfg(feature = "google-drive")]
pub use google_drive::GoogleDriveStorage;
#[cfg(any(test, feature = "test-helpers"))]
pub use mock::{MockDriveBackend, StoredUpload};
pub use traits::{DriveBackend, StorageError, StorageResult, UploadBody, UploadRequest};
