//! Bounded retry with exponential backoff.
//!
//! [`retry_with_backoff`] runs an async operation until it succeeds, fails
//! with a permanent error, or exhausts the attempt budget. Classification
//! walks the whole error chain: structured signals from [`AppError`] win,
//! otherwise the rendered message is inspected for transient keywords and
//! retryable HTTP status codes.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{ApiError, AppError, Transience};

const TRANSIENT_KEYWORDS: [&str; 4] = ["connection", "timeout", "network", "temporary"];

static TRANSIENT_CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(429|500|502|503|504)\b").expect("static regex is valid")
});

/// Number of attempts used for every remote storage call.
pub const STORAGE_MAX_ATTEMPTS: u32 = 5;

/// Retry policy: attempt budget and exponential delay schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Policy for remote storage calls (folder query/create, file upload).
    pub const fn storage(multiplier: f64) -> Self {
        Self::new(STORAGE_MAX_ATTEMPTS, Duration::from_secs(1), multiplier)
    }

    /// Delay slept after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        self.base_delay.mul_f64(factor.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.5)
    }
}

/// Returns true if `err` is likely to succeed on retry.
pub fn is_transient(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        let structural = if let Some(app) = cause.downcast_ref::<AppError>() {
            app.transience()
        } else if let Some(api) = cause.downcast_ref::<ApiError>() {
            api.transience()
        } else {
            Transience::Unknown
        };

        match structural {
            Transience::Transient => return true,
            Transience::Permanent => return false,
            Transience::Unknown => {}
        }
    }

    message_looks_transient(&format!("{:#}", err))
}

/// Message-only classification used when no structured signal exists.
pub fn message_looks_transient(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSIENT_KEYWORDS.iter().any(|kw| lowered.contains(kw))
        || TRANSIENT_CODE_PATTERN.is_match(&lowered)
}

/// Run `op` under `policy`.
///
/// Permanent errors are returned unchanged after a single attempt. Transient
/// errors sleep `base_delay * multiplier^attempt` before the next attempt;
/// the final attempt's error is returned without sleeping.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(operation, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_transient(&err) {
                    tracing::debug!(operation, error = %err, "Permanent error, not retrying");
                    return Err(err);
                }

                if attempt + 1 >= max_attempts {
                    tracing::error!(
                        operation,
                        attempts = max_attempts,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
