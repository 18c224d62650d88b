//! Discord REST v10 adapter for [`ChatPlatform`].

use std::time::Duration;

use async_trait::async_trait;
use photodrop_core::Attachment;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::platform::{
    Channel, ChannelKind, ChatPlatform, Emoji, Message, PlatformError, PlatformResult, Reaction,
    Snowflake,
};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Largest page the messages endpoint returns.
const PAGE_SIZE: usize = 100;
/// Attempts per request when rate limited.
const MAX_RATE_LIMIT_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    last_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    url: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
}

#[derive(Debug, Deserialize)]
struct RawEmoji {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawRole {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawThreadList {
    threads: Vec<RawChannel>,
}

#[derive(Debug, Deserialize)]
struct RawApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    retry_after: Option<f64>,
}

fn snowflake(value: &str) -> PlatformResult<Snowflake> {
    value
        .trim()
        .parse()
        .map_err(|_| PlatformError::InvalidResponse(format!("invalid snowflake '{}'", value)))
}

fn channel_kind(kind: u8) -> ChannelKind {
    match kind {
        0 | 5 => ChannelKind::Text,
        10..=12 => ChannelKind::Thread,
        _ => ChannelKind::Other,
    }
}

impl TryFrom<RawChannel> for Channel {
    type Error = PlatformError;

    fn try_from(raw: RawChannel) -> PlatformResult<Self> {
        Ok(Channel {
            id: snowflake(&raw.id)?,
            name: raw.name.unwrap_or_default(),
            kind: channel_kind(raw.kind),
            parent_id: raw.parent_id.as_deref().map(snowflake).transpose()?,
            last_message_id: raw.last_message_id.as_deref().map(snowflake).transpose()?,
        })
    }
}

impl RawMessage {
    fn into_message(self, default_guild: Snowflake) -> PlatformResult<Message> {
        Ok(Message {
            id: snowflake(&self.id)?,
            channel_id: snowflake(&self.channel_id)?,
            // Channel message endpoints omit guild_id; every channel read here
            // belongs to the configured guild.
            guild_id: Some(match self.guild_id.as_deref() {
                Some(id) => snowflake(id)?,
                None => default_guild,
            }),
            content: self.content,
            attachments: self
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    url: a.url,
                    filename: a.filename,
                    size: a.size,
                })
                .collect(),
        })
    }
}

/// Path segment identifying a reaction emoji. Custom emoji names are
/// restricted to word characters, so `name:id` needs no escaping.
fn reaction_path_segment(reaction: &Reaction) -> String {
    match reaction {
        Reaction::Custom(emoji) => format!("{}:{}", emoji.name, emoji.id),
        Reaction::Unicode(value) => urlencoding::encode(value).into_owned(),
    }
}

pub struct DiscordClient {
    http_client: Client,
    api_base: String,
    auth_header: String,
    guild_id: Snowflake,
}

impl DiscordClient {
    pub fn new(http_client: Client, token: &str, guild_id: Snowflake) -> Self {
        Self {
            http_client,
            api_base: DISCORD_API_BASE.to_string(),
            auth_header: format!("Bot {}", token.trim()),
            guild_id,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn http_client(timeout: Duration) -> anyhow::Result<Client> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Send a request, waiting out rate limits a bounded number of times.
    async fn send<F>(&self, path: &str, build: F) -> PlatformResult<Response>
    where
        F: Fn(&Client, String) -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            let response = build(&self.http_client, self.url(path))
                .header(AUTHORIZATION, &self.auth_header)
                .send()
                .await
                .map_err(|e| PlatformError::Network(format!("request to {} failed: {}", path, e)))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let parsed: Option<RawApiError> = serde_json::from_str(&body).ok();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RATE_LIMIT_ATTEMPTS {
                let wait = parsed
                    .as_ref()
                    .and_then(|e| e.retry_after)
                    .unwrap_or(1.0)
                    .clamp(0.0, 60.0);
                tracing::warn!(path, attempt, retry_after_secs = wait, "Rate limited by Discord");
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                attempt += 1;
                continue;
            }

            let message = parsed
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            tracing::debug!(path, status = status.as_u16(), message = %message, "Discord request failed");
            return Err(match status {
                StatusCode::NOT_FOUND => PlatformError::NotFound(format!("{}: {}", path, message)),
                StatusCode::FORBIDDEN => PlatformError::Forbidden(format!("{}: {}", path, message)),
                _ => PlatformError::Http {
                    status: status.as_u16(),
                    message,
                },
            });
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> PlatformResult<T> {
        self.get_json_with_query(path, &[]).await
    }

    async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> PlatformResult<T> {
        let response = self
            .send(path, |client, url| client.get(url).query(query))
            .await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn message_page(
        &self,
        channel_id: Snowflake,
        cursor: (&str, Option<Snowflake>),
    ) -> PlatformResult<Vec<Message>> {
        let mut query = vec![("limit", PAGE_SIZE.to_string())];
        if let (key, Some(id)) = cursor {
            query.push((key, id.to_string()));
        }
        let raw: Vec<RawMessage> = self
            .get_json_with_query(&format!("/channels/{}/messages", channel_id), &query)
            .await?;
        raw.into_iter()
            .map(|m| m.into_message(self.guild_id))
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn channel(&self, channel_id: Snowflake) -> PlatformResult<Channel> {
        let raw: RawChannel = self.get_json(&format!("/channels/{}", channel_id)).await?;
        raw.try_into()
    }

    async fn history(&self, channel_id: Snowflake) -> PlatformResult<Vec<Message>> {
        let mut messages = Vec::new();
        let mut before = None;
        loop {
            let page = self.message_page(channel_id, ("before", before)).await?;
            let full = page.len() == PAGE_SIZE;
            before = page.iter().map(|m| m.id).min();
            messages.extend(page);
            if !full || before.is_none() {
                break;
            }
        }
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    async fn messages_after(
        &self,
        channel_id: Snowflake,
        after: Snowflake,
    ) -> PlatformResult<Vec<Message>> {
        let mut messages = Vec::new();
        let mut cursor = after;
        loop {
            let page = self.message_page(channel_id, ("after", Some(cursor))).await?;
            let full = page.len() == PAGE_SIZE;
            let newest = page.iter().map(|m| m.id).max();
            messages.extend(page.into_iter().filter(|m| m.id > after));
            match newest {
                Some(id) if full && id > cursor => cursor = id,
                _ => break,
            }
        }
        messages.sort_by_key(|m| m.id);
        messages.dedup_by_key(|m| m.id);
        Ok(messages)
    }

    async fn message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> PlatformResult<Message> {
        let raw: RawMessage = self
            .get_json(&format!("/channels/{}/messages/{}", channel_id, message_id))
            .await?;
        raw.into_message(self.guild_id)
    }

    async fn text_channels(&self, guild_id: Snowflake) -> PlatformResult<Vec<Channel>> {
        let raw: Vec<RawChannel> = self.get_json(&format!("/guilds/{}/channels", guild_id)).await?;
        let channels = raw
            .into_iter()
            .map(Channel::try_from)
            .collect::<PlatformResult<Vec<_>>>()?;
        Ok(channels
            .into_iter()
            .filter(|c| c.kind == ChannelKind::Text)
            .collect())
    }

    async fn active_threads(&self, guild_id: Snowflake) -> PlatformResult<Vec<Channel>> {
        let raw: RawThreadList = self
            .get_json(&format!("/guilds/{}/threads/active", guild_id))
            .await?;
        raw.threads.into_iter().map(Channel::try_from).collect()
    }

    async fn emojis(&self, guild_id: Snowflake) -> PlatformResult<Vec<Emoji>> {
        let raw: Vec<RawEmoji> = self.get_json(&format!("/guilds/{}/emojis", guild_id)).await?;
        let mut emojis = Vec::with_capacity(raw.len());
        for emoji in raw {
            if let (Some(id), Some(name)) = (emoji.id, emoji.name) {
                emojis.push(Emoji {
                    id: snowflake(&id)?,
                    name,
                });
            }
        }
        Ok(emojis)
    }

    async fn member_role_names(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> PlatformResult<Vec<String>> {
        let member: RawMember = self
            .get_json(&format!("/guilds/{}/members/{}", guild_id, user_id))
            .await?;
        let roles: Vec<RawRole> = self.get_json(&format!("/guilds/{}/roles", guild_id)).await?;
        Ok(roles
            .into_iter()
            .filter(|role| member.roles.contains(&role.id))
            .map(|role| role.name)
            .collect())
    }

    async fn add_reaction(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        reaction: &Reaction,
    ) -> PlatformResult<()> {
        let path = format!(
            "/channels/{}/messages/{}/reactions/{}/@me",
            channel_id,
            message_id,
            reaction_path_segment(reaction)
        );
        self.send(&path, |client, url| client.put(url).header(CONTENT_LENGTH, 0))
            .await?;
        Ok(())
    }
}
