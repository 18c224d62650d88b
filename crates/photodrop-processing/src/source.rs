//! Where attachment bytes are downloaded from.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use photodrop_core::AppError;
use reqwest::header::CONTENT_LENGTH;

/// Body chunks of a streaming download.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, AppError>> + Send>>;

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Size advertised by the server. Best effort: any failure is `None`.
    async fn content_length(&self, url: &str) -> Option<u64>;

    /// Download the whole body.
    async fn fetch(&self, url: &str) -> Result<Bytes, AppError>;

    /// Start a streaming download.
    async fn open_stream(&self, url: &str) -> Result<ByteStream, AppError>;
}

/// HTTP(S) source backed by `reqwest`.
#[derive(Clone)]
pub struct HttpSource {
    http_client: reqwest::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn get_ok(&self, url: &str) -> Result<reqwest::Response, AppError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        tracing::debug!(url, status = status.as_u16(), "Download response");
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> AppError {
    AppError::Network(format!("request to {} failed: {}", url, err))
}

#[async_trait]
impl MediaSource for HttpSource {
    async fn content_length(&self, url: &str) -> Option<u64> {
        let response = match self.http_client.head(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(url, error = %e, "Failed to get file size");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(url, status = response.status().as_u16(), "Could not retrieve file size");
            return None;
        }

        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        tracing::debug!(url, ?size, "File size");
        size
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, AppError> {
        let response = self.get_ok(url).await?;
        response.bytes().await.map_err(|e| transport_error(url, e))
    }

    async fn open_stream(&self, url: &str) -> Result<ByteStream, AppError> {
        let response = self.get_ok(url).await?;
        let owned_url = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| transport_error(&owned_url, e)));
        Ok(Box::pin(stream))
    }
}
