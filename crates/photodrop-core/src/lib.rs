//! Photodrop Core Library
//!
//! Configuration, error types, naming rules, the retry engine and the shared
//! root-folder cell used by every other photodrop crate.

pub mod config;
pub mod error;
pub mod models;
pub mod naming;
pub mod retry;
pub mod root_folder;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, AppError, LogLevel, Transience};
pub use models::{Attachment, MediaKind};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use root_folder::{RootFolder, RootFolderState, RootFolderStore};
