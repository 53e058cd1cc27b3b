//! KuCoin Listing Sniper - single-position sniping bot with trailing-stop exit
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - New listings are violently volatile; the trailing stop is best-effort,
//!   not a guaranteed fill price.
//! - Fresh pairs can list with no liquidity at all.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use kucoin_sniper::cli::commands;
use kucoin_sniper::config::Config;

/// KuCoin listing sniper - buy a new pair the moment it trades, exit on a
/// trailing stop
#[derive(Parser)]
#[command(name = "snipe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sniper bot
    Start {
        /// Simulate fills against live market data (no real orders)
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the persisted position and ledger
    Status,

    /// Show current configuration (credentials stay in the environment)
    Config,

    /// Check connectivity (exchange, Telegram)
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kucoin_sniper=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Start { dry_run } => commands::start(&config, dry_run).await,
        Commands::Status => commands::status(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
