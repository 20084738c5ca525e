//! # chatmirror
//!
//! Command line driver for the chatmirror sync engine.
//!
//! ## Commands
//!
//! - `check-config`: Print the effective engine options
//! - `replay`: Feed a JSON-lines file of push frames through the engine
//!
//! ## Example
//!
//! ```bash
//! # Show options (from ~/.config/chatmirror/config.toml or built-in defaults)
//! chatmirror check-config
//!
//! # Replay captured push events with chat 123@c.us in the foreground
//! RUST_LOG=debug chatmirror replay events.jsonl --chat 123@c.us
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{check_config, replay};

/// Command line driver for the chatmirror sync engine.
#[derive(Parser, Debug)]
#[command(name = "chatmirror")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Engine options file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and print the effective engine options
    CheckConfig,

    /// Replay push frames through the engine against a mock remote
    Replay {
        /// JSON-lines file, one push frame per line
        file: PathBuf,

        /// Chat to bring to the foreground before replaying
        #[arg(long)]
        chat: Option<String>,

        /// How long to let the engine run, in milliseconds
        #[arg(long, default_value = "500")]
        settle_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let loaded = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::CheckConfig => {
            check_config::run(&loaded)?;
        }
        Commands::Replay {
            file,
            chat,
            settle_ms,
        } => {
            replay::run(loaded.options, &file, chat, settle_ms).await?;
        }
    }

    Ok(())
}
