//! FIX engine operator tool
//!
//! Loads the engine configuration, opens every configured session's store
//! and audit log, and reports or resets their state.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use fix_engine::{config::CONFIG_FILE_ENV, initialize_logging_with_config, load_configuration, Engine};

#[derive(Parser)]
#[command(name = "fix-engine", version, about = "Inspect FIX session state")]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print sequence numbers and creation time of every session
    Status,
    /// Reset sequence numbers and stored messages of one session
    Reset {
        /// Session identifier as printed by `status`
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref())?;
    let _guard =
        initialize_logging_with_config(&config.logging.level, &config.logging.format, config.logging.file.as_deref())?;

    info!("Starting FIX engine tool v{}", env!("CARGO_PKG_VERSION"));
    let engine = Engine::new(config).await.context("Failed to initialize engine")?;

    match cli.command {
        Command::Status => {
            for session_id in engine.session_ids() {
                let resources = engine.session(&session_id).await?;
                println!(
                    "{session_id}  next_sender={}  next_target={}  created={}",
                    resources.store.next_sender_msg_seq_num(),
                    resources.store.next_target_msg_seq_num(),
                    resources.store.creation_time().to_rfc3339_opts(SecondsFormat::Micros, true),
                );
                resources.close().await?;
            }
        }
        Command::Reset { session } => {
            let session_id = engine
                .session_ids()
                .into_iter()
                .find(|id| id.to_string() == session)
                .with_context(|| format!("Unknown session: {session}"))?;

            let mut resources = engine.session(&session_id).await?;
            resources.store.reset().await.context("Failed to reset store")?;
            resources.log.on_event("Session reset by operator");
            info!(session = %session_id, "Session reset");
            resources.close().await?;
        }
    }

    engine.shutdown().await;
    Ok(())
}
