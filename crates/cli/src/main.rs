//! Threadwise CLI, the main entry point.
//!
//! Commands:
//! - `onboard`  Write a default config
//! - `status`   Show resolved configuration
//! - `windows`  List stored summary windows for a channel
//! - `chat`     Interactive session over the local transport

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "threadwise",
    about = "Threadwise: context assembly and capability orchestration for chat assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Show resolved configuration
    Status,

    /// List stored summary windows for a channel
    Windows {
        /// Channel id
        channel: String,
    },

    /// Chat interactively in a local channel
    Chat {
        /// Channel id to chat in
        #[arg(short, long, default_value = "general")]
        channel: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Status => commands::status::run().await?,
        Commands::Windows { channel } => commands::windows::run(&channel).await?,
        Commands::Chat { channel } => commands::chat::run(&channel).await?,
    }

    Ok(())
}
