//! Test helpers: build an AppState over in-memory platform, storage and
//! download source.
#![allow(dead_code)]

pub mod platform;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use photodrop_bot::{AppState, Reaction, Services};
use photodrop_core::{AppError, Config, RootFolder, RootFolderStore};
use photodrop_infra::MemoryProbe;
use photodrop_processing::{ByteStream, MediaSource};
use photodrop_storage::MockDriveBackend;
use tempfile::TempDir;

pub use platform::{MockPlatform, GUILD_ID};

pub const ROOT_FOLDER: &str = "root";
pub const WATCHED_CHANNEL: &str = "photos";
pub const ADMIN_ROLE: &str = "Photo Admin";
pub const PAYLOAD: &[u8] = b"payload";

pub const IMAGE_URL: &str = "https://cdn.discordapp.com/attachments/1/2/beach.png";
pub const VIDEO_URL: &str = "https://cdn.discordapp.com/attachments/1/3/clip.mp4";

/// Serves the same body for every URL.
pub struct StaticSource;

#[async_trait]
impl MediaSource for StaticSource {
    async fn content_length(&self, _url: &str) -> Option<u64> {
        Some(PAYLOAD.len() as u64)
    }

    async fn fetch(&self, _url: &str) -> Result<Bytes, AppError> {
        Ok(Bytes::from_static(PAYLOAD))
    }

    async fn open_stream(&self, _url: &str) -> Result<ByteStream, AppError> {
        Ok(Box::pin(stream::iter(vec![Ok(Bytes::from_static(PAYLOAD))])))
    }
}

pub struct PlentyOfMemory;

#[async_trait]
impl MemoryProbe for PlentyOfMemory {
    async fn available_memory(&self) -> Option<u64> {
        Some(1 << 30)
    }
}

pub struct TestApp {
    pub state: AppState,
    pub platform: Arc<MockPlatform>,
    pub backend: Arc<MockDriveBackend>,
    pub store: RootFolderStore,
    pub _temp_dir: TempDir,
}

impl TestApp {
    /// Wait for every queued upload.
    pub async fn drain(&self) {
        self.state.shutdown().await;
    }

    pub async fn folder_id(&self, name: &str) -> Option<String> {
        self.state.folders.resolve(name).await
    }
}

pub fn test_config(temp_dir: &TempDir) -> Config {
    let state_file = temp_dir.path().join("state.json").display().to_string();
    Config::from_lookup(|key| {
        let value = match key {
            "DISCORD_TOKEN" => "test-token",
            "GUILD_ID" => "900",
            "SHARED_DRIVE_ID" => "drive",
            "PARENT_FOLDER_ID" => ROOT_FOLDER,
            "CHANNEL_NAME" => WATCHED_CHANNEL,
            "ROLE_NAME" => ADMIN_ROLE,
            "VIDEO_IN_MEMORY" => "true",
            "STATE_FILE" => state_file.as_str(),
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap()
}

pub async fn setup_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = test_config(&temp_dir);
    let platform = Arc::new(MockPlatform::new());
    let backend = Arc::new(MockDriveBackend::new());
    let store = RootFolderStore::new(&config.state_file);

    let services = Services {
        platform: platform.clone(),
        backend: backend.clone(),
        source: Arc::new(StaticSource),
        memory: Arc::new(PlentyOfMemory),
    };
    let state = AppState::assemble(config, services, RootFolder::new(ROOT_FOLDER), store.clone());

    TestApp {
        state,
        platform,
        backend,
        store,
        _temp_dir: temp_dir,
    }
}

pub fn thumbs_up() -> Reaction {
    Reaction::Unicode("👍".to_string())
}
