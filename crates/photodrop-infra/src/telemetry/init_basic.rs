use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set: photodrop crates at `log_level`,
/// everything else at `warn`.
pub fn default_filter(log_level: &str) -> String {
    format!("warn,photodrop={}", log_level)
}

/// Initialize tracing with an `EnvFilter` and a fmt layer.
///
/// `RUST_LOG` wins over `log_level` when set. Calling this twice is an error
/// rather than a panic.
pub fn init_telemetry(log_level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    tracing::debug!(log_level, "Tracing initialized");
    Ok(())
}
