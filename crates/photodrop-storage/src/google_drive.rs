//! Google Drive v3 storage backend (shared drives).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use photodrop_core::naming::escape_query_literal;
use photodrop_core::ApiError;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::auth::AccessTokenSource;
use crate::traits::{
    DriveBackend, StorageError, StorageResult, UploadBody, UploadRequest, FOLDER_MIME_TYPE,
};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRef {
    id: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    trashed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Google Drive storage implementation
#[derive(Clone)]
pub struct GoogleDriveStorage {
    http_client: reqwest::Client,
    auth: Arc<dyn AccessTokenSource>,
    shared_drive_id: String,
    api_base: String,
    upload_base: String,
}

impl GoogleDriveStorage {
    pub fn new(
        http_client: reqwest::Client,
        auth: Arc<dyn AccessTokenSource>,
        shared_drive_id: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            auth,
            shared_drive_id: shared_drive_id.into(),
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_urls(mut self, api_base: String, upload_base: String) -> Self {
        self.api_base = api_base;
        self.upload_base = upload_base;
        self
    }

    /// Build the HTTP client used for both auth and Drive calls.
    pub fn http_client(timeout: Duration) -> StorageResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))
    }

    fn folder_query(parent_id: &str, name: &str) -> String {
        format!(
            "'{}' in parents and name='{}' and mimeType='{}' and trashed=false",
            escape_query_literal(parent_id),
            escape_query_literal(name),
            FOLDER_MIME_TYPE
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> StorageResult<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> StorageError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        StorageError::Network(err.to_string())
    } else {
        StorageError::InvalidResponse(err.to_string())
    }
}

async fn api_error(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<GoogleErrorBody>(&body) {
        Ok(parsed) => {
            let reasons: Vec<&str> = parsed
                .error
                .errors
                .iter()
                .map(|d| d.reason.as_str())
                .filter(|r| !r.is_empty())
                .collect();
            if reasons.is_empty() {
                parsed.error.message
            } else {
                format!("{} ({})", parsed.error.message, reasons.join(", "))
            }
        }
        Err(_) => body,
    };

    StorageError::Api(ApiError::new("drive", status, message))
}

async fn json_body<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> StorageResult<T> {
    response
        .json()
        .await
        .map_err(|e| StorageError::InvalidResponse(format!("Failed to parse Drive response: {}", e)))
}

#[async_trait]
impl DriveBackend for GoogleDriveStorage {
    async fn find_folder(&self, parent_id: &str, name: &str) -> StorageResult<Option<String>> {
        let query = Self::folder_query(parent_id, name);
        let request = self.http_client.get(format!("{}/files", self.api_base)).query(&[
            ("q", query.as_str()),
            ("corpora", "drive"),
            ("driveId", self.shared_drive_id.as_str()),
            ("includeItemsFromAllDrives", "true"),
            ("supportsAllDrives", "true"),
            ("fields", "files(id,name)"),
            ("pageSize", "1"),
        ]);

        let list: FileList = json_body(self.send(request).await?).await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> StorageResult<String> {
        let request = self
            .http_client
            .post(format!("{}/files", self.api_base))
            .query(&[("supportsAllDrives", "true"), ("fields", "id,name")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id],
            }));

        let file: FileRef = json_body(self.send(request).await?).await?;
        Ok(file.id)
    }

    async fn folder_exists(&self, folder_id: &str) -> StorageResult<bool> {
        let request = self
            .http_client
            .get(format!(
                "{}/files/{}",
                self.api_base,
                urlencoding::encode(folder_id)
            ))
            .query(&[
                ("supportsAllDrives", "true"),
                ("fields", "id,mimeType,trashed"),
            ]);

        match self.send(request).await {
            Ok(response) => {
                let file: FileRef = json_body(response).await?;
                Ok(file.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
                    && !file.trashed.unwrap_or(false))
            }
            Err(StorageError::Api(api)) if api.status == 404 => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn upload_file(&self, request: UploadRequest) -> StorageResult<String> {
        let length = request.body.len().await?;

        // Open a resumable session, then send the whole body in one PUT.
        let init = self
            .http_client
            .post(format!("{}/files", self.upload_base))
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", "id"),
            ])
            .header("X-Upload-Content-Type", request.mime_type.as_str())
            .header("X-Upload-Content-Length", length)
            .json(&json!({
                "name": request.name,
                "parents": [request.parent_id],
                "mimeType": request.mime_type,
            }));

        let session = self.send(init).await?;
        let location = session
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                StorageError::InvalidResponse("Resumable session has no Location header".to_string())
            })?
            .to_string();

        let body = match request.body {
            UploadBody::Bytes(bytes) => reqwest::Body::from(bytes),
            UploadBody::Path(path) => {
                let file = tokio::fs::File::open(&path).await?;
                reqwest::Body::wrap_stream(ReaderStream::new(file))
            }
        };

        let put = self
            .http_client
            .put(location)
            .header(CONTENT_TYPE, request.mime_type.as_str())
            .header(CONTENT_LENGTH, length)
            .body(body);

        let file: FileRef = json_body(self.send(put).await?).await?;
        tracing::debug!(
            file_id = %file.id,
            name = %request.name,
            size = length,
            "Drive upload completed"
        );
        Ok(file.id)
    }
}
