//! In-memory chat platform.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use photodrop_bot::{
    Channel, ChannelKind, ChatPlatform, Emoji, Message, PlatformError, PlatformResult, Reaction,
    Snowflake,
};
use photodrop_core::Attachment;

pub const GUILD_ID: Snowflake = 900;

#[derive(Default)]
struct State {
    channels: BTreeMap<Snowflake, Channel>,
    messages: HashMap<Snowflake, Vec<Message>>,
    emojis: Vec<Emoji>,
    member_roles: HashMap<Snowflake, Vec<String>>,
    forbidden: HashSet<Snowflake>,
    archived: HashSet<Snowflake>,
    reject_custom_reactions: bool,
    reactions: Vec<(Snowflake, Reaction)>,
}

#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<State>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_channel(&self, channel: Channel) -> Channel {
        self.state
            .lock()
            .unwrap()
            .channels
            .insert(channel.id, channel.clone());
        channel
    }

    pub fn add_text_channel(&self, id: Snowflake, name: &str) -> Channel {
        self.add_channel(Channel {
            id,
            name: name.to_string(),
            kind: ChannelKind::Text,
            parent_id: None,
            last_message_id: None,
        })
    }

    pub fn add_thread(&self, id: Snowflake, name: &str, parent_id: Snowflake) -> Channel {
        self.add_channel(Channel {
            id,
            name: name.to_string(),
            kind: ChannelKind::Thread,
            parent_id: Some(parent_id),
            last_message_id: None,
        })
    }

    /// Post a message and bump the channel's newest message id.
    pub fn post(&self, channel_id: Snowflake, id: Snowflake, content: &str, urls: &[&str]) -> Message {
        let message = Message {
            id,
            channel_id,
            guild_id: Some(GUILD_ID),
            content: content.to_string(),
            attachments: urls.iter().map(|u| Attachment::new(*u)).collect(),
        };
        let mut state = self.state.lock().unwrap();
        state
            .messages
            .entry(channel_id)
            .or_default()
            .push(message.clone());
        if let Some(channel) = state.channels.get_mut(&channel_id) {
            channel.last_message_id = Some(channel.last_message_id.unwrap_or(0).max(id));
        }
        message
    }

    pub fn channel_snapshot(&self, id: Snowflake) -> Channel {
        self.state.lock().unwrap().channels[&id].clone()
    }

    pub fn add_emoji(&self, id: Snowflake, name: &str) {
        self.state.lock().unwrap().emojis.push(Emoji {
            id,
            name: name.to_string(),
        });
    }

    pub fn grant_role(&self, user_id: Snowflake, role: &str) {
        self.state
            .lock()
            .unwrap()
            .member_roles
            .entry(user_id)
            .or_default()
            .push(role.to_string());
    }

    pub fn forbid(&self, channel_id: Snowflake) {
        self.state.lock().unwrap().forbidden.insert(channel_id);
    }

    /// Hide a thread from the active list, as Discord does for idle threads.
    pub fn archive(&self, thread_id: Snowflake) {
        self.state.lock().unwrap().archived.insert(thread_id);
    }

    pub fn unarchive(&self, thread_id: Snowflake) {
        self.state.lock().unwrap().archived.remove(&thread_id);
    }

    pub fn reject_custom_reactions(&self) {
        self.state.lock().unwrap().reject_custom_reactions = true;
    }

    pub fn reactions(&self) -> Vec<(Snowflake, Reaction)> {
        self.state.lock().unwrap().reactions.clone()
    }

    fn check_access(state: &State, channel_id: Snowflake) -> PlatformResult<()> {
        if state.forbidden.contains(&channel_id) {
            return Err(PlatformError::Forbidden(format!("channel {}", channel_id)));
        }
        if !state.channels.contains_key(&channel_id) {
            return Err(PlatformError::NotFound(format!("channel {}", channel_id)));
        }
        Ok(())
    }

    fn sorted_messages(state: &State, channel_id: Snowflake) -> Vec<Message> {
        let mut messages = state.messages.get(&channel_id).cloned().unwrap_or_default();
        messages.sort_by_key(|m| m.id);
        messages
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn channel(&self, channel_id: Snowflake) -> PlatformResult<Channel> {
        let state = self.state.lock().unwrap();
        Self::check_access(&state, channel_id)?;
        Ok(state.channels[&channel_id].clone())
    }

    async fn history(&self, channel_id: Snowflake) -> PlatformResult<Vec<Message>> {
        let state = self.state.lock().unwrap();
        Self::check_access(&state, channel_id)?;
        Ok(Self::sorted_messages(&state, channel_id))
    }

    async fn messages_after(
        &self,
        channel_id: Snowflake,
        after: Snowflake,
    ) -> PlatformResult<Vec<Message>> {
        let state = self.state.lock().unwrap();
        Self::check_access(&state, channel_id)?;
        Ok(Self::sorted_messages(&state, channel_id)
            .into_iter()
            .filter(|m| m.id > after)
            .collect())
    }

    async fn message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> PlatformResult<Message> {
        let state = self.state.lock().unwrap();
        Self::check_access(&state, channel_id)?;
        Self::sorted_messages(&state, channel_id)
            .into_iter()
            .find(|m| m.id == message_id)
            .ok_or_else(|| PlatformError::NotFound(format!("message {}", message_id)))
    }

    async fn text_channels(&self, _guild_id: Snowflake) -> PlatformResult<Vec<Channel>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .channels
            .values()
            .filter(|c| c.kind == ChannelKind::Text)
            .cloned()
            .collect())
    }

    async fn active_threads(&self, _guild_id: Snowflake) -> PlatformResult<Vec<Channel>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .channels
            .values()
            .filter(|c| c.kind == ChannelKind::Thread && !state.archived.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn emojis(&self, _guild_id: Snowflake) -> PlatformResult<Vec<Emoji>> {
        Ok(self.state.lock().unwrap().emojis.clone())
    }

    async fn member_role_names(
        &self,
        _guild_id: Snowflake,
        user_id: Snowflake,
    ) -> PlatformResult<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .member_roles
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("member {}", user_id)))
    }

    async fn add_reaction(
        &self,
        _channel_id: Snowflake,
        message_id: Snowflake,
        reaction: &Reaction,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.reject_custom_reactions && matches!(reaction, Reaction::Custom(_)) {
            return Err(PlatformError::Forbidden("custom emoji".to_string()));
        }
        state.reactions.push((message_id, reaction.clone()));
        Ok(())
    }
}
