//! photodrop: uploads photos and videos posted in chat threads to Google Drive.
//!
//! Configuration is read from the environment (and `.env`); see `Config`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use photodrop_bot::{AppState, Command};
use photodrop_core::{Attachment, Config};

#[derive(Parser)]
#[command(name = "photodrop", about = "Upload chat thread media to Google Drive")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch threads under the configured channel and upload new attachments
    Watch,
    /// Upload every attachment in a thread
    Thread {
        /// Thread ID
        thread_id: String,
    },
    /// Upload the attachments of one message into a named folder
    Message {
        /// Message ID
        message_id: String,
        /// Folder the attachments are uploaded to
        folder_name: String,
    },
    /// Change the root upload folder
    ChangeFolder {
        /// Drive folder ID
        folder_id: String,
        /// ID of the member requesting the change
        #[arg(long)]
        user: u64,
    },
    /// Upload media URLs directly into a named folder
    Upload {
        /// Folder the files are uploaded to
        folder_name: String,
        /// Media URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    config
        .validate()
        .context("Configuration validation failed")?;
    photodrop_infra::init_telemetry(&config.log_level)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;
    tracing::info!("Configuration loaded and validated successfully");

    let state = AppState::from_config(config).await?;

    match cli.command {
        Commands::Watch => {
            state.watcher().run(shutdown_signal()).await;
        }
        Commands::Thread { thread_id } => {
            let reply = state
                .commands
                .execute(Command::ThreadImages { thread_id }, 0)
                .await;
            println!("{}", reply.content);
        }
        Commands::Message {
            message_id,
            folder_name,
        } => {
            let reply = state
                .commands
                .execute(
                    Command::MessageImages {
                        message_id,
                        folder_name,
                    },
                    0,
                )
                .await;
            println!("{}", reply.content);
        }
        Commands::ChangeFolder { folder_id, user } => {
            let reply = state
                .commands
                .execute(Command::ChangeFolder { folder_id }, user)
                .await;
            println!("{}", reply.content);
        }
        Commands::Upload { folder_name, urls } => {
            let attachments: Vec<Attachment> = urls.into_iter().map(Attachment::new).collect();
            let queued = state
                .intake
                .queue_attachments(&folder_name, &attachments, None);
            println!(
                "Queued {} of {} attachments for {}",
                queued,
                attachments.len(),
                folder_name
            );
        }
    }

    state.shutdown().await;
    Ok(())
}
