//! Message intake
//!
//! Turns chat messages into pipeline jobs on the dispatcher and acknowledges
//! them with a reaction. Nothing here waits for an upload to finish.

use std::sync::Arc;

use photodrop_core::Attachment;
use photodrop_processing::{FetchAndStore, MediaJob};
use photodrop_worker::TaskDispatcher;

use crate::platform::{Channel, ChatPlatform, Message, Reaction};

/// Messages containing this text (any case) are never uploaded.
pub const NO_UPLOAD_MARKER: &str = "no upload";
/// Reaction used when the custom acknowledgement emoji is unavailable.
pub const FALLBACK_REACTION: &str = "👍";

/// True if `message` carries attachments and has not opted out.
pub fn wants_upload(message: &Message) -> bool {
    !message.attachments.is_empty() && !message.content.to_lowercase().contains(NO_UPLOAD_MARKER)
}

pub struct Intake {
    platform: Arc<dyn ChatPlatform>,
    pipeline: Arc<FetchAndStore>,
    dispatcher: Arc<TaskDispatcher>,
    watched_channel: String,
    ack_emoji: String,
}

impl Intake {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        pipeline: Arc<FetchAndStore>,
        dispatcher: Arc<TaskDispatcher>,
        watched_channel: impl Into<String>,
        ack_emoji: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            pipeline,
            dispatcher,
            watched_channel: watched_channel.into(),
            ack_emoji: ack_emoji.into(),
        }
    }

    pub fn watched_channel(&self) -> &str {
        &self.watched_channel
    }

    /// Queue the attachments of `message` and acknowledge it.
    ///
    /// The folder is named after `thread_name`, or the message's channel when
    /// absent. Returns false if the message was skipped.
    pub async fn process_message(
        &self,
        message: &Message,
        channel: &Channel,
        thread_name: Option<&str>,
        folder_id: Option<String>,
    ) -> bool {
        if !wants_upload(message) {
            return false;
        }

        let name = thread_name.unwrap_or(&channel.name);
        tracing::info!(
            message_id = message.id,
            folder = %name,
            attachments = message.attachments.len(),
            "Received message"
        );
        self.queue_attachments(name, &message.attachments, folder_id);
        self.acknowledge(message).await;
        true
    }

    /// Submit one pipeline job per supported attachment. Returns how many
    /// were queued.
    pub fn queue_attachments(
        &self,
        logical_name: &str,
        attachments: &[Attachment],
        folder_id: Option<String>,
    ) -> usize {
        let mut queued = 0;
        for attachment in attachments {
            let Some(job) = MediaJob::from_attachment(logical_name, attachment, folder_id.clone())
            else {
                tracing::debug!(url = %attachment.url, "Skipping unsupported attachment");
                continue;
            };

            let pipeline = self.pipeline.clone();
            let label = job.label();
            match self
                .dispatcher
                .submit(label, async move { pipeline.run(&job).await })
            {
                Ok(id) => {
                    tracing::debug!(task_id = id, url = %attachment.url, "Queued attachment");
                    queued += 1;
                }
                Err(e) => {
                    tracing::error!(url = %attachment.url, error = %e, "Failed to queue attachment");
                }
            }
        }
        queued
    }

    /// Intake entry for messages seen in watched threads.
    ///
    /// Only threads whose parent is the watched channel are processed.
    pub async fn on_thread_message(&self, message: &Message, thread: &Channel, parent: &Channel) -> bool {
        let watched = thread.is_thread()
            && thread.parent_id == Some(parent.id)
            && parent.name == self.watched_channel;
        if !watched {
            return false;
        }
        tracing::debug!(message_id = message.id, thread = %thread.name, "Received thread message");
        self.process_message(message, thread, None, None).await
    }

    async fn acknowledge(&self, message: &Message) {
        if let Some(guild_id) = message.guild_id {
            match self.platform.emojis(guild_id).await {
                Ok(emojis) => {
                    if let Some(emoji) = emojis.into_iter().find(|e| e.name == self.ack_emoji) {
                        let reaction = Reaction::Custom(emoji);
                        match self.react(message, &reaction).await {
                            Ok(()) => return,
                            Err(e) => {
                                tracing::debug!(error = %e, "Custom reaction failed, using fallback")
                            }
                        }
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Failed to list guild emojis"),
            }
        }

        if let Err(e) = self
            .react(message, &Reaction::Unicode(FALLBACK_REACTION.to_string()))
            .await
        {
            tracing::warn!(message_id = message.id, error = %e, "Failed to acknowledge message");
        }
    }

    async fn react(
        &self,
        message: &Message,
        reaction: &Reaction,
    ) -> Result<(), crate::platform::PlatformError> {
        self.platform
            .add_reaction(message.channel_id, message.id, reaction)
            .await
    }
}
