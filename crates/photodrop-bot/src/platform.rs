//! Chat platform boundary
//!
//! Everything the bot needs from the messaging service, expressed over plain
//! domain types so intake, commands and the watcher can run against an
//! in-memory platform in tests.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use photodrop_core::Attachment;

/// Platform object id.
pub type Snowflake = u64;

/// Discord epoch (2015-01-01T00:00:00Z) in Unix milliseconds.
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Smallest snowflake that could be minted at `time`. Every message or
/// thread created at or after `time` has an id at least this large.
pub fn snowflake_at(time: SystemTime) -> Snowflake {
    let unix_ms = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    unix_ms.saturating_sub(DISCORD_EPOCH_MS) << 22
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Thread,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: Snowflake,
    pub name: String,
    pub kind: ChannelKind,
    /// Parent text channel, for threads.
    pub parent_id: Option<Snowflake>,
    pub last_message_id: Option<Snowflake>,
}

impl Channel {
    pub fn is_thread(&self) -> bool {
        self.kind == ChannelKind::Thread
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    /// `None` for direct messages.
    pub guild_id: Option<Snowflake>,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emoji {
    pub id: Snowflake,
    pub name: String,
}

/// Emoji used for a reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Custom(Emoji),
    Unicode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Platform API error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn channel(&self, channel_id: Snowflake) -> PlatformResult<Channel>;

    /// Every message of a channel, oldest first.
    async fn history(&self, channel_id: Snowflake) -> PlatformResult<Vec<Message>>;

    /// Messages newer than `after`, oldest first.
    async fn messages_after(
        &self,
        channel_id: Snowflake,
        after: Snowflake,
    ) -> PlatformResult<Vec<Message>>;

    async fn message(&self, channel_id: Snowflake, message_id: Snowflake)
        -> PlatformResult<Message>;

    async fn text_channels(&self, guild_id: Snowflake) -> PlatformResult<Vec<Channel>>;

    async fn active_threads(&self, guild_id: Snowflake) -> PlatformResult<Vec<Channel>>;

    async fn emojis(&self, guild_id: Snowflake) -> PlatformResult<Vec<Emoji>>;

    /// Names of the roles held by a guild member.
    async fn member_role_names(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> PlatformResult<Vec<String>>;

    async fn add_reaction(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        reaction: &Reaction,
    ) -> PlatformResult<()>;
}
