//! Chat front end for photodrop: Discord adapter, message intake, admin
//! commands and the thread watcher.

pub mod admin;
pub mod commands;
pub mod discord;
pub mod intake;
pub mod platform;
pub mod state;
pub mod watcher;

pub use admin::{ChangeFolderError, RootFolderAdmin};
pub use commands::{Command, Commands, Reply};
pub use discord::DiscordClient;
pub use intake::Intake;
pub use platform::{
    snowflake_at, Channel, ChannelKind, ChatPlatform, Emoji, Message, PlatformError,
    PlatformResult, Reaction, Snowflake,
};
pub use state::{AppState, Services};
pub use watcher::ThreadWatcher;
