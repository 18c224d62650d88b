//! Uploads one file into a remote folder under the storage retry policy.

use std::sync::Arc;

use photodrop_core::{retry_with_backoff, MediaKind, RetryPolicy};
use photodrop_storage::{DriveBackend, UploadBody, UploadRequest};

/// A file ready to be written to remote storage.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub folder_id: String,
    pub file_name: String,
    pub extension: String,
    pub kind: MediaKind,
    pub body: UploadBody,
}

/// MIME type for `kind` and `extension`, with `jpg` normalised to `jpeg`.
pub fn mime_type(kind: MediaKind, extension: &str) -> String {
    let extension = extension.to_lowercase();
    let extension = if extension == "jpg" { "jpeg" } else { &extension };
    format!("{}/{}", kind.as_mime_prefix(), extension)
}

/// Name the file is stored under remotely.
pub fn remote_file_name(file_name: &str) -> String {
    file_name.to_uppercase()
}

pub struct Uploader {
    backend: Arc<dyn DriveBackend>,
    policy: RetryPolicy,
}

impl Uploader {
    pub fn new(backend: Arc<dyn DriveBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Upload `job` and return the remote file id.
    ///
    /// The error after exhausted retries is returned to the caller.
    pub async fn upload(&self, job: UploadJob) -> anyhow::Result<String> {
        let request = UploadRequest {
            parent_id: job.folder_id,
            name: remote_file_name(&job.file_name),
            mime_type: mime_type(job.kind, &job.extension),
            body: job.body,
        };

        let backend = &self.backend;
        let request = &request;
        retry_with_backoff(&self.policy, "upload_file", || async move {
            backend
                .upload_file(request.clone())
                .await
                .map_err(|e| e.into_retryable())
        })
        .await
    }
}
