//! Application state and service wiring.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use photodrop_core::{Config, RetryPolicy, RootFolder, RootFolderStore};
use photodrop_infra::{CapacityChecker, MemoryProbe, SystemMemory};
use photodrop_processing::{
    default_decoder, FetchAndStore, HttpSource, MediaSource, PipelineSettings, Uploader,
    HEIF_SUPPORT,
};
use photodrop_storage::{
    DriveBackend, FolderCache, GoogleDriveStorage, ServiceAccountAuth, ServiceAccountKey,
};
use photodrop_worker::{DispatcherConfig, TaskDispatcher};

use crate::admin::RootFolderAdmin;
use crate::commands::Commands;
use crate::discord::DiscordClient;
use crate::intake::Intake;
use crate::platform::ChatPlatform;
use crate::watcher::ThreadWatcher;

/// External collaborators the state is assembled from.
pub struct Services {
    pub platform: Arc<dyn ChatPlatform>,
    pub backend: Arc<dyn DriveBackend>,
    pub source: Arc<dyn MediaSource>,
    pub memory: Arc<dyn MemoryProbe>,
}

pub struct AppState {
    pub config: Config,
    pub platform: Arc<dyn ChatPlatform>,
    pub folders: Arc<FolderCache>,
    pub pipeline: Arc<FetchAndStore>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub intake: Arc<Intake>,
    pub admin: Arc<RootFolderAdmin>,
    pub commands: Commands,
}

/// Root folder to start with: the persisted one if any, else the configured one.
pub async fn initial_root_folder(
    config: &Config,
    store: &RootFolderStore,
) -> anyhow::Result<RootFolder> {
    let persisted = store
        .load()
        .await
        .with_context(|| format!("Failed to read state file {}", store.path().display()))?;

    let id = match persisted {
        Some(state) => {
            tracing::info!(
                folder_id = %state.parent_folder_id,
                updated_at = %state.updated_at,
                "Using persisted root folder"
            );
            state.parent_folder_id
        }
        None => config.parent_folder_id.clone(),
    };
    Ok(RootFolder::new(id))
}

impl AppState {
    /// Build production services from `config`: Discord, Google Drive with a
    /// verified service account, HTTP downloads and the system memory probe.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        if !HEIF_SUPPORT {
            tracing::warn!("Built without the heif feature, HEIC/HEIF images will be uploaded unconverted");
        }
        let timeout = Duration::from_secs(config.http_timeout_secs);

        let key = ServiceAccountKey::from_file(&config.service_account_file)
            .await
            .with_context(|| {
                format!(
                    "Failed to load service account key {}",
                    config.service_account_file.display()
                )
            })?;
        let drive_client = GoogleDriveStorage::http_client(timeout)?;
        let auth = Arc::new(ServiceAccountAuth::new(
            drive_client.clone(),
            key,
            config.delegate_email.clone(),
        )?);
        auth.access_token()
            .await
            .context("Failed to authenticate Google Drive service")?;
        tracing::info!(client_email = %auth.client_email(), "Authenticated with Google Drive");

        let backend: Arc<dyn DriveBackend> = Arc::new(GoogleDriveStorage::new(
            drive_client,
            auth,
            config.shared_drive_id.clone(),
        ));
        let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordClient::new(
            DiscordClient::http_client(timeout)?,
            &config.discord_token,
            config.guild_id,
        ));
        let source: Arc<dyn MediaSource> = Arc::new(HttpSource::new(timeout)?);

        let services = Services {
            platform,
            backend,
            source,
            memory: Arc::new(SystemMemory::new()),
        };
        let store = RootFolderStore::new(&config.state_file);
        let root = initial_root_folder(&config, &store).await?;
        Ok(Self::assemble(config, services, root, store))
    }

    /// Wire the state from already-built collaborators. Requires a tokio runtime.
    pub fn assemble(
        config: Config,
        services: Services,
        root: RootFolder,
        store: RootFolderStore,
    ) -> Self {
        let storage_policy = RetryPolicy::storage(config.retry_backoff_multiplier);

        let folders = Arc::new(FolderCache::new(
            services.backend.clone(),
            root,
            storage_policy,
        ));
        let pipeline = Arc::new(FetchAndStore::new(
            services.source,
            folders.clone(),
            Uploader::new(services.backend.clone(), storage_policy),
            CapacityChecker::new(services.memory, config.memory_reserve_percent),
            default_decoder(),
            PipelineSettings::from_config(&config),
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(DispatcherConfig {
            max_workers: config.thread_pool_workers,
        }));
        let intake = Arc::new(Intake::new(
            services.platform.clone(),
            pipeline.clone(),
            dispatcher.clone(),
            config.channel_name.clone(),
            config.ack_emoji.clone(),
        ));
        let admin = Arc::new(RootFolderAdmin::new(
            services.backend,
            folders.clone(),
            store,
            storage_policy,
        ));
        let commands = Commands::new(
            services.platform.clone(),
            intake.clone(),
            admin.clone(),
            config.guild_id,
            config.role_name.clone(),
        );

        tracing::info!(
            root_folder = %folders.root().snapshot(),
            workers = config.thread_pool_workers,
            video_in_memory = config.video_in_memory,
            "Application state initialized"
        );

        Self {
            config,
            platform: services.platform,
            folders,
            pipeline,
            dispatcher,
            intake,
            admin,
            commands,
        }
    }

    pub fn watcher(&self) -> ThreadWatcher {
        ThreadWatcher::new(
            self.platform.clone(),
            self.intake.clone(),
            self.config.guild_id,
            Duration::from_secs(self.config.poll_interval_secs),
        )
    }

    /// Drain outstanding uploads.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}
