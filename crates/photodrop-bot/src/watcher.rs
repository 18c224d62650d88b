//! Thread watcher: polls the watched channel's active threads for new
//! messages and feeds them to intake.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::intake::Intake;
use crate::platform::{snowflake_at, Channel, ChatPlatform, PlatformResult, Snowflake};

pub struct ThreadWatcher {
    platform: Arc<dyn ChatPlatform>,
    intake: Arc<Intake>,
    guild_id: Snowflake,
    interval: Duration,
    /// Messages at or below this id predate the watcher and are never read.
    start_cutoff: Snowflake,
    /// Newest message id handled per thread. Entries outlive the thread's
    /// presence in the active list so an archived thread resumes where it
    /// stopped when it is unarchived.
    last_seen: HashMap<Snowflake, Snowflake>,
}

impl ThreadWatcher {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        intake: Arc<Intake>,
        guild_id: Snowflake,
        interval: Duration,
    ) -> Self {
        Self {
            platform,
            intake,
            guild_id,
            interval,
            start_cutoff: snowflake_at(SystemTime::now()),
            last_seen: HashMap::new(),
        }
    }

    /// Override the id below which messages are treated as history.
    pub fn with_start_cutoff(mut self, cutoff: Snowflake) -> Self {
        self.start_cutoff = cutoff;
        self
    }

    /// Poll until `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tracing::info!(
            channel = %self.intake.watched_channel(),
            interval_secs = self.interval.as_secs(),
            "Thread watcher started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(0) => tracing::trace!("No new thread messages"),
                        Ok(processed) => tracing::debug!(processed, "Processed thread messages"),
                        Err(e) => tracing::error!(error = %e, "Thread poll failed"),
                    }
                }
            }
        }
        tracing::info!("Thread watcher stopped");
    }

    /// One poll cycle. Returns the number of messages handed to intake.
    ///
    /// A thread seen for the first time is read from the start cutoff, so
    /// threads created while the watcher runs are read in full while older
    /// history (including that of threads revived from the archive) is left
    /// to `threadimages`.
    pub async fn poll_once(&mut self) -> PlatformResult<usize> {
        let parents: HashMap<Snowflake, Channel> = self
            .platform
            .text_channels(self.guild_id)
            .await?
            .into_iter()
            .filter(|c| c.name == self.intake.watched_channel())
            .map(|c| (c.id, c))
            .collect();

        let threads: Vec<Channel> = self
            .platform
            .active_threads(self.guild_id)
            .await?
            .into_iter()
            .filter(|t| t.parent_id.is_some_and(|p| parents.contains_key(&p)))
            .collect();

        let mut processed = 0;
        for thread in &threads {
            let Some(parent) = thread.parent_id.and_then(|p| parents.get(&p)) else {
                continue;
            };

            let after = *self
                .last_seen
                .entry(thread.id)
                .or_insert(self.start_cutoff);
            if thread.last_message_id.is_some_and(|newest| newest <= after) {
                continue;
            }

            let messages = match self.platform.messages_after(thread.id, after).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(thread = %thread.name, error = %e, "Failed to read thread messages");
                    continue;
                }
            };
            for message in &messages {
                if self.intake.on_thread_message(message, thread, parent).await {
                    processed += 1;
                }
            }
            let newest = messages.iter().map(|m| m.id).max().unwrap_or(after);
            self.last_seen.insert(thread.id, newest);
        }

        Ok(processed)
    }
}
