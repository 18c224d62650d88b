//! Admin and backfill commands
//!
//! Every command answers with an ephemeral [`Reply`]. Failures are reported in
//! the reply text and logged; they never escape as errors.

use std::sync::Arc;

use crate::admin::{is_valid_folder_id, ChangeFolderError, RootFolderAdmin};
use crate::intake::Intake;
use crate::platform::{ChatPlatform, PlatformError, Snowflake};

pub const GENERIC_ERROR: &str = "An error occurred";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
}

impl Reply {
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    ThreadImages { thread_id: String },
    MessageImages { message_id: String, folder_name: String },
    ChangeFolder { folder_id: String },
}

pub struct Commands {
    platform: Arc<dyn ChatPlatform>,
    intake: Arc<Intake>,
    admin: Arc<RootFolderAdmin>,
    guild_id: Snowflake,
    admin_role: String,
}

impl Commands {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        intake: Arc<Intake>,
        admin: Arc<RootFolderAdmin>,
        guild_id: Snowflake,
        admin_role: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            intake,
            admin,
            guild_id,
            admin_role: admin_role.into(),
        }
    }

    /// Run `command` on behalf of user `invoker`.
    pub async fn execute(&self, command: Command, invoker: Snowflake) -> Reply {
        match command {
            Command::Help => self.help(),
            Command::ThreadImages { thread_id } => self.thread_images(&thread_id).await,
            Command::MessageImages {
                message_id,
                folder_name,
            } => self.message_images(&message_id, &folder_name).await,
            Command::ChangeFolder { folder_id } => self.change_folder(invoker, &folder_id).await,
        }
    }

    pub fn help(&self) -> Reply {
        Reply::ephemeral(
            "Available commands:\n\
             /threadimages <thread_id> - upload every attachment in a thread\n\
             /messageimages <message_id> <folder_name> - upload the attachments of one message into a folder\n\
             /changefolder <folder_id> - change the root upload folder (admin only)",
        )
    }

    /// Process every message of a thread.
    pub async fn thread_images(&self, thread_id: &str) -> Reply {
        tracing::info!(thread_id, "Reading thread command called");
        let Ok(id) = thread_id.trim().parse::<Snowflake>() else {
            return Reply::ephemeral("Given ID was not an integer");
        };

        let thread = match self.platform.channel(id).await {
            Ok(channel) => channel,
            Err(PlatformError::NotFound(_)) => {
                tracing::info!(thread_id, "Thread not found");
                return Reply::ephemeral("Thread not found. Please check the thread ID.");
            }
            Err(e) => {
                tracing::error!(thread_id, error = %e, "Failed to fetch thread");
                return Reply::ephemeral(GENERIC_ERROR);
            }
        };
        if !thread.is_thread() {
            return Reply::ephemeral("The provided ID does not correspond to a thread.");
        }

        let history = match self.platform.history(thread.id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(thread_id, error = %e, "Failed to read thread history");
                return Reply::ephemeral(GENERIC_ERROR);
            }
        };

        let mut processed = 0;
        for message in &history {
            if self.intake.process_message(message, &thread, None, None).await {
                processed += 1;
            }
        }
        tracing::info!(thread = %thread.name, messages = history.len(), processed, "Thread read");
        Reply::ephemeral(format!(
            "Reading messages in thread: {} ({} of {} messages had uploads)",
            thread.name,
            processed,
            history.len()
        ))
    }

    /// Find a message in any readable text channel and upload its attachments
    /// into `folder_name`.
    pub async fn message_images(&self, message_id: &str, folder_name: &str) -> Reply {
        tracing::info!(message_id, "Reading message command called");
        let Ok(id) = message_id.trim().parse::<Snowflake>() else {
            tracing::info!(message_id, "Given message id was not an integer");
            return Reply::ephemeral("Given ID was not an integer");
        };

        let channels = match self.platform.text_channels(self.guild_id).await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list text channels");
                return Reply::ephemeral("An error occurred contact administrator");
            }
        };

        for channel in &channels {
            match self.platform.message(channel.id, id).await {
                Ok(message) => {
                    tracing::debug!(channel = %channel.name, message_id = id, "Message found");
                    self.intake
                        .process_message(&message, channel, Some(folder_name), None)
                        .await;
                    return Reply::ephemeral(format!(
                        "Photo/Videos being uploaded to {}",
                        folder_name
                    ));
                }
                Err(PlatformError::NotFound(_)) => {
                    tracing::debug!(channel = %channel.name, "Message not found in channel");
                }
                Err(PlatformError::Forbidden(_)) => {
                    tracing::warn!(channel = %channel.name, "Bot does not have permission to read channel");
                }
                Err(e) => {
                    tracing::error!(channel = %channel.name, error = %e, "Failed to fetch message");
                    return Reply::ephemeral("An error occurred contact administrator");
                }
            }
        }

        tracing::info!(message_id = id, "Message not found in any accessible channels");
        Reply::ephemeral(
            "Message could not be found by the bot, check that the bot has permission to view the channel the message is in",
        )
    }

    /// Change the root upload folder. Requires the admin role.
    pub async fn change_folder(&self, invoker: Snowflake, folder_id: &str) -> Reply {
        let folder_id = folder_id.trim();
        tracing::info!(user_id = invoker, folder_id, "Change folder command called");
        if !is_valid_folder_id(folder_id) {
            return Reply::ephemeral(format!("'{}' is not a valid folder ID", folder_id));
        }

        let roles = match self
            .platform
            .member_role_names(self.guild_id, invoker)
            .await
        {
            Ok(roles) => roles,
            Err(PlatformError::NotFound(_)) => Vec::new(),
            Err(e) => {
                tracing::error!(user_id = invoker, error = %e, "Failed to read member roles");
                return Reply::ephemeral(GENERIC_ERROR);
            }
        };
        if !roles.iter().any(|r| r == &self.admin_role) {
            tracing::warn!(user_id = invoker, "Change folder denied, missing role");
            return Reply::ephemeral(format!(
                "You need the {} role to change the upload folder",
                self.admin_role
            ));
        }

        match self.admin.change_root_folder(folder_id).await {
            Ok(previous) => Reply::ephemeral(format!(
                "Upload folder changed from {} to {}",
                previous, folder_id
            )),
            Err(e @ ChangeFolderError::Persist { .. }) => {
                tracing::error!(error = %e, "Failed to persist root folder");
                Reply::ephemeral(e.to_string())
            }
            Err(e) => {
                tracing::info!(error = %e, "Root folder change rejected");
                Reply::ephemeral(e.to_string())
            }
        }
    }
}
