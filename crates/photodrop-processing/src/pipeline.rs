//! Fetch-and-store pipeline
//!
//! One [`MediaJob`] per attachment: resolve the target folder, download the
//! payload, convert legacy images, upload. Images are always handled in
//! memory. Videos are buffered in memory only when enabled, their size is
//! known and the host has headroom for them; otherwise they are spooled to a
//! temporary file that is removed however the attempt ends.
//!
//! Both entry points are wrapped end-to-end in the pipeline retry policy, so
//! a transient failure restarts the whole download and upload.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use photodrop_core::naming::{extract_extension, extract_file_name};
use photodrop_core::{retry_with_backoff, AppError, Attachment, Config, MediaKind, RetryPolicy};
use photodrop_infra::CapacityChecker;
use photodrop_storage::{FolderCache, UploadBody};
use tokio::io::AsyncWriteExt;

use crate::source::MediaSource;
use crate::transcode::{is_legacy_extension, transcode_legacy_image, LegacyImageDecoder, Transcoded};
use crate::upload::{UploadJob, Uploader};

/// One attachment to download and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaJob {
    pub url: String,
    pub file_name: String,
    pub extension: String,
    pub kind: MediaKind,
    /// Thread name the folder is derived from.
    pub logical_name: String,
    /// Pre-resolved folder; skips the folder cache when set.
    pub folder_id: Option<String>,
}

impl MediaJob {
    /// Build a job from an attachment, or `None` if it is not a supported
    /// image or video or no file name can be extracted from its URL.
    pub fn from_attachment(
        logical_name: &str,
        attachment: &Attachment,
        folder_id: Option<String>,
    ) -> Option<Self> {
        let kind = attachment.kind()?;
        let file_name = match extract_file_name(kind.name_pattern(), &attachment.url) {
            Some(name) => name,
            None => {
                tracing::debug!(url = %attachment.url, "Failed to find file name");
                return None;
            }
        };
        let extension = extract_extension(&file_name);

        Some(Self {
            url: attachment.url.clone(),
            file_name,
            extension,
            kind,
            logical_name: logical_name.to_string(),
            folder_id,
        })
    }

    pub fn label(&self) -> String {
        format!("{} -> {}", self.file_name, self.logical_name)
    }
}

/// Pipeline tuning taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub video_in_memory: bool,
    pub max_file_size: Option<u64>,
    pub policy: RetryPolicy,
    /// Directory for spooled videos; the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            video_in_memory: config.video_in_memory,
            max_file_size: config.max_file_size_bytes,
            policy: RetryPolicy::new(
                config.max_retries,
                Duration::from_secs(1),
                config.retry_backoff_multiplier,
            ),
            temp_dir: None,
        }
    }
}

/// Where a video payload is held between download and upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoRoute {
    Memory,
    Disk,
}

pub struct FetchAndStore {
    source: Arc<dyn MediaSource>,
    folders: Arc<FolderCache>,
    uploader: Uploader,
    capacity: CapacityChecker,
    decoder: Arc<dyn LegacyImageDecoder>,
    settings: PipelineSettings,
}

impl FetchAndStore {
    pub fn new(
        source: Arc<dyn MediaSource>,
        folders: Arc<FolderCache>,
        uploader: Uploader,
        capacity: CapacityChecker,
        decoder: Arc<dyn LegacyImageDecoder>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            folders,
            uploader,
            capacity,
            decoder,
            settings,
        }
    }

    pub fn folders(&self) -> &Arc<FolderCache> {
        &self.folders
    }

    /// Resolve the job's folder and store the attachment in it.
    ///
    /// Returns the remote file id.
    pub async fn run(&self, job: &MediaJob) -> anyhow::Result<String> {
        let folder_id = match &job.folder_id {
            Some(id) => id.clone(),
            None => self
                .folders
                .resolve_or_create(&job.logical_name)
                .await
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "folder for '{}' could not be resolved",
                        job.logical_name
                    ))
                })?,
        };

        let file_id = match job.kind {
            MediaKind::Image => self.fetch_image(job, &folder_id).await?,
            MediaKind::Video => self.fetch_video(job, &folder_id).await?,
        };
        tracing::info!(
            file_name = %job.file_name,
            folder = %job.logical_name,
            file_id = %file_id,
            "Uploaded attachment"
        );
        Ok(file_id)
    }

    /// Download an image, convert it if needed and upload it from memory.
    pub async fn fetch_image(&self, job: &MediaJob, folder_id: &str) -> anyhow::Result<String> {
        retry_with_backoff(&self.settings.policy, "fetch_image", || async move {
            self.fetch_image_once(job, folder_id).await
        })
        .await
    }

    /// Download a video through memory or a temp file and upload it.
    pub async fn fetch_video(&self, job: &MediaJob, folder_id: &str) -> anyhow::Result<String> {
        retry_with_backoff(&self.settings.policy, "fetch_video", || async move {
            self.fetch_video_once(job, folder_id).await
        })
        .await
    }

    /// Decide how a video of `length` bytes is held.
    pub async fn choose_route(&self, length: Option<u64>) -> VideoRoute {
        let Some(length) = length.filter(|_| self.settings.video_in_memory) else {
            return VideoRoute::Disk;
        };
        if self.capacity.has_memory_for(length).await {
            VideoRoute::Memory
        } else {
            VideoRoute::Disk
        }
    }

    fn check_size(&self, size: u64) -> Result<(), AppError> {
        match self.settings.max_file_size {
            Some(limit) if size > limit => Err(AppError::FileTooLarge { size, limit }),
            _ => Ok(()),
        }
    }

    async fn fetch_image_once(&self, job: &MediaJob, folder_id: &str) -> anyhow::Result<String> {
        tracing::debug!(url = %job.url, "Downloading image");
        let data = self.source.fetch(&job.url).await?;
        self.check_size(data.len() as u64)?;
        tracing::debug!(url = %job.url, size = data.len(), "Downloaded image");

        let (bytes, file_name, extension) = self.maybe_transcode(job, data).await;

        self.uploader
            .upload(UploadJob {
                folder_id: folder_id.to_string(),
                file_name,
                extension,
                kind: MediaKind::Image,
                body: UploadBody::Bytes(bytes),
            })
            .await
    }

    async fn maybe_transcode(&self, job: &MediaJob, data: Bytes) -> (Bytes, String, String) {
        if !is_legacy_extension(&job.extension) {
            return (data, job.file_name.clone(), job.extension.clone());
        }

        let decoder = self.decoder.clone();
        let input = data.clone();
        let file_name = job.file_name.clone();
        let extension = job.extension.clone();
        let converted = tokio::task::spawn_blocking(move || {
            transcode_legacy_image(decoder.as_ref(), &input, &file_name, &extension)
        })
        .await;

        match converted {
            Ok(Transcoded::Converted {
                bytes,
                file_name,
                extension,
            }) => (bytes, file_name, extension),
            Ok(Transcoded::Unchanged) => (data, job.file_name.clone(), job.extension.clone()),
            Err(e) => {
                tracing::debug!(error = %e, "Transcode task failed, uploading original");
                (data, job.file_name.clone(), job.extension.clone())
            }
        }
    }

    async fn fetch_video_once(&self, job: &MediaJob, folder_id: &str) -> anyhow::Result<String> {
        tracing::debug!(url = %job.url, "Downloading video");
        let length = self.source.content_length(&job.url).await;
        if let Some(length) = length {
            self.check_size(length)?;
        }

        let mut stream = self.source.open_stream(&job.url).await?;
        let route = self.choose_route(length).await;
        let mut received: u64 = 0;

        let upload = |body: UploadBody| UploadJob {
            folder_id: folder_id.to_string(),
            file_name: job.file_name.clone(),
            extension: job.extension.clone(),
            kind: MediaKind::Video,
            body,
        };

        match route {
            VideoRoute::Memory => {
                tracing::debug!(url = %job.url, "Downloading video to memory");
                let mut buffer = BytesMut::with_capacity(length.unwrap_or(0) as usize);
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    received += chunk.len() as u64;
                    self.check_size(received)?;
                    buffer.extend_from_slice(&chunk);
                }
                tracing::debug!(size = received, "Completed download to memory");

                self.uploader
                    .upload(upload(UploadBody::Bytes(buffer.freeze())))
                    .await
            }
            VideoRoute::Disk => {
                let mut builder = tempfile::Builder::new();
                let suffix = format!(".{}", job.extension);
                builder.prefix("photodrop-").suffix(&suffix);
                let temp = match &self.settings.temp_dir {
                    Some(dir) => builder.tempfile_in(dir),
                    None => builder.tempfile(),
                }
                .context("Failed to create temp file for video")?;
                tracing::debug!(url = %job.url, path = %temp.path().display(), "Downloading video to disk");

                let mut file = tokio::fs::File::from_std(temp.reopen()?);
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    received += chunk.len() as u64;
                    self.check_size(received)?;
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                drop(file);
                tracing::debug!(size = received, path = %temp.path().display(), "Completed download to disk");

                // `temp` is removed when it drops, whatever the upload result.
                self.uploader
                    .upload(upload(UploadBody::Path(temp.path().to_path_buf())))
                    .await
            }
        }
    }
}
