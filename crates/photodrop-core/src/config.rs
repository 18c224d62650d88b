//! Configuration module
//!
//! All settings come from environment variables (a `.env` file is honoured
//! through `dotenvy`). Missing mandatory values are startup errors.

use std::env;
use std::path::PathBuf;

const CHANNEL_NAME: &str = "photos";
const ROLE_NAME: &str = "Photo Admin";
const SERVICE_ACCOUNT_FILE: &str = "config/service-credentials.json";
const STATE_FILE: &str = "config/state.json";
const MEMORY_RESERVE_PERCENT: f64 = 10.0;
const THREAD_POOL_WORKERS: usize = 4;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_MULTIPLIER: f64 = 2.5;
const POLL_INTERVAL_SECS: u64 = 15;
const HTTP_TIMEOUT_SECS: u64 = 120;
const LOG_LEVEL: &str = "info";
const ACK_EMOJI: &str = "glump_photo";

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    // Chat platform
    pub discord_token: String,
    pub guild_id: u64,
    pub channel_name: String,
    pub role_name: String,
    pub ack_emoji: String,
    pub poll_interval_secs: u64,
    // Cloud storage
    pub shared_drive_id: String,
    pub parent_folder_id: String,
    pub delegate_email: Option<String>,
    pub service_account_file: PathBuf,
    pub state_file: PathBuf,
    // Pipeline
    pub video_in_memory: bool,
    /// `None` means unlimited (`MAX_FILE_SIZE_MB=0` or unset).
    pub max_file_size_bytes: Option<u64>,
    pub memory_reserve_percent: f64,
    pub thread_pool_workers: usize,
    pub max_retries: u32,
    pub retry_backoff_multiplier: f64,
    pub http_timeout_secs: u64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} must be set", key))
        };

        let max_file_size_mb: u64 = lookup("MAX_FILE_SIZE_MB")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let max_file_size_bytes = match max_file_size_mb {
            0 => None,
            mb => Some(mb.checked_mul(1024 * 1024).ok_or_else(|| {
                anyhow::anyhow!("MAX_FILE_SIZE_MB is too large: {}", mb)
            })?),
        };

        let config = Config {
            discord_token: required("DISCORD_TOKEN")?,
            guild_id: required("GUILD_ID")?
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("GUILD_ID must be a numeric snowflake"))?,
            channel_name: lookup("CHANNEL_NAME").unwrap_or_else(|| CHANNEL_NAME.to_string()),
            role_name: lookup("ROLE_NAME").unwrap_or_else(|| ROLE_NAME.to_string()),
            ack_emoji: lookup("ACK_EMOJI").unwrap_or_else(|| ACK_EMOJI.to_string()),
            poll_interval_secs: lookup("POLL_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(POLL_INTERVAL_SECS),
            shared_drive_id: required("SHARED_DRIVE_ID")?,
            parent_folder_id: required("PARENT_FOLDER_ID")?,
            delegate_email: lookup("DELEGATE_EMAIL").filter(|s| !s.is_empty()),
            service_account_file: lookup("SERVICE_ACCOUNT_FILE")
                .unwrap_or_else(|| SERVICE_ACCOUNT_FILE.to_string())
                .into(),
            state_file: lookup("STATE_FILE")
                .unwrap_or_else(|| STATE_FILE.to_string())
                .into(),
            video_in_memory: lookup("VIDEO_IN_MEMORY")
                .unwrap_or_else(|| "false".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            max_file_size_bytes,
            memory_reserve_percent: lookup("MEMORY_RESERVE_PERCENT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(MEMORY_RESERVE_PERCENT),
            thread_pool_workers: lookup("THREAD_POOL_WORKERS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(THREAD_POOL_WORKERS),
            max_retries: lookup("MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_RETRIES),
            retry_backoff_multiplier: lookup("RETRY_BACKOFF_MULTIPLIER")
                .and_then(|s| s.parse().ok())
                .unwrap_or(RETRY_BACKOFF_MULTIPLIER),
            http_timeout_secs: lookup("HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(HTTP_TIMEOUT_SECS),
            log_level: lookup("LOG_LEVEL")
                .unwrap_or_else(|| LOG_LEVEL.to_string())
                .to_lowercase(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(0.0..100.0).contains(&self.memory_reserve_percent) {
            return Err(anyhow::anyhow!(
                "MEMORY_RESERVE_PERCENT must be in [0, 100), got {}",
                self.memory_reserve_percent
            ));
        }

        if self.thread_pool_workers == 0 {
            return Err(anyhow::anyhow!("THREAD_POOL_WORKERS must be at least 1"));
        }

        if self.max_retries == 0 {
            return Err(anyhow::anyhow!("MAX_RETRIES must be at least 1"));
        }

        if self.retry_backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!(
                "RETRY_BACKOFF_MULTIPLIER must be >= 1.0, got {}",
                self.retry_backoff_multiplier
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(anyhow::anyhow!("POLL_INTERVAL_SECS must be at least 1"));
        }

        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(anyhow::anyhow!(
                "LOG_LEVEL must be one of trace, debug, info, warn, error"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DISCORD_TOKEN", "token"),
            ("GUILD_ID", "123456789"),
            ("SHARED_DRIVE_ID", "drive"),
            ("PARENT_FOLDER_ID", "root"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> anyhow::Result<Config> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let config = load(&base_vars()).unwrap();
        assert_eq!(config.guild_id, 123456789);
        assert_eq!(config.thread_pool_workers, 4);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff_multiplier, 2.5);
        assert_eq!(config.memory_reserve_percent, 10.0);
        assert_eq!(config.max_file_size_bytes, None);
        assert!(!config.video_in_memory);
        assert_eq!(config.state_file, PathBuf::from("config/state.json"));
        assert_eq!(config.ack_emoji, "glump_photo");
    }

    #[test]
    fn missing_token_is_an_error() {
        let mut vars = base_vars();
        vars.remove("DISCORD_TOKEN");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn size_limit_is_converted_to_bytes() {
        let mut vars = base_vars();
        vars.insert("MAX_FILE_SIZE_MB", "25");
        vars.insert("VIDEO_IN_MEMORY", "TRUE");
        let config = load(&vars).unwrap();
        assert_eq!(config.max_file_size_bytes, Some(25 * 1024 * 1024));
        assert!(config.video_in_memory);
    }

    #[test]
    fn size_limit_that_overflows_bytes_is_rejected() {
        let mut vars = base_vars();
        vars.insert("MAX_FILE_SIZE_MB", "18014398509481983");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("MAX_FILE_SIZE_MB"));
    }

    #[test]
    fn out_of_range_reserve_is_rejected() {
        let mut vars = base_vars();
        vars.insert("MEMORY_RESERVE_PERCENT", "150");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn non_numeric_guild_is_rejected() {
        let mut vars = base_vars();
        vars.insert("GUILD_ID", "my-guild");
        assert!(load(&vars).is_err());
    }
}
