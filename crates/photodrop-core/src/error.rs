//! Error types module
//!
//! `AppError` is the shared vocabulary for failures that cross crate
//! boundaries. Storage and processing code map transport failures into these
//! variants so the retry engine can classify them without knowing which HTTP
//! client produced them.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like best-effort fallbacks
    Debug,
    /// Warning level - for recoverable issues like retried requests
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// HTTP status codes that indicate a server-side or rate-limit condition.
pub const TRANSIENT_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Returns true if `status` is one of [`TRANSIENT_STATUS_CODES`].
pub fn is_transient_status(status: u16) -> bool {
    TRANSIENT_STATUS_CODES.contains(&status)
}

/// Error returned by a cloud storage API call that produced an HTTP response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{service} API error (HTTP {status}): {message}")]
pub struct ApiError {
    pub service: &'static str,
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self {
            service,
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} error downloading {url}")]
    HttpStatus { url: String, status: u16 },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("File size {size} exceeds limit {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upload request has neither a byte stream nor a file path")]
    MissingUploadBody,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How the retry engine should treat an error, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transience {
    /// Retrying is likely to succeed.
    Transient,
    /// Never retry, even if the message looks transient.
    Permanent,
    /// No structural signal; fall back to message inspection.
    Unknown,
}

impl AppError {
    /// Structural classification of this error for the retry engine.
    pub fn transience(&self) -> Transience {
        match self {
            AppError::Network(_) => Transience::Transient,
            AppError::HttpStatus { status, .. } => {
                if is_transient_status(*status) {
                    Transience::Transient
                } else {
                    Transience::Permanent
                }
            }
            AppError::Api(api) => api.transience(),
            AppError::FileTooLarge { .. }
            | AppError::InvalidInput(_)
            | AppError::MissingUploadBody
            | AppError::Config(_) => Transience::Permanent,
            AppError::NotFound(_)
            | AppError::Forbidden(_)
            | AppError::Io(_)
            | AppError::Internal(_) => Transience::Unknown,
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self.transience() {
            Transience::Transient => LogLevel::Warn,
            Transience::Permanent | Transience::Unknown => LogLevel::Error,
        }
    }
}

impl ApiError {
    /// A cloud API error is transient when its status is retryable, or when
    /// the provider embedded a retryable code (429/500/503) in the message.
    pub fn transience(&self) -> Transience {
        if is_transient_status(self.status)
            || ["429", "500", "503"]
                .iter()
                .any(|code| self.message.contains(code))
        {
            Transience::Transient
        } else {
            Transience::Unknown
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}
