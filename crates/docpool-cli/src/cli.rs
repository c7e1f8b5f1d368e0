//! docpool - inspect and exercise configured document store pools

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docpool_connection::PoolRegistry;
use docpool_core::StoreConfig;
use docpool_driver_mongodb::MongoDbDriver;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

#[derive(Debug, Parser)]
#[command(name = "docpool", version, about = "Inspect and exercise docpool connection pools")]
struct Cli {
    /// Pool configuration file
    #[arg(short, long, global = true, env = "DOCPOOL_CONFIG", default_value = "docpool.toml")]
    config: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open a connection to each pool and report its health
    Ping(commands::PingArgs),
    /// Warm every configured pool and print its counters
    Stats,
    /// Count documents matching a filter
    Count(commands::CountArgs),
    /// Print documents matching a filter as relaxed extended JSON
    Find(commands::FindArgs),
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v so individual targets can be tuned
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::debug!(config = %cli.config.display(), "loading pool configuration");
    let config = StoreConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let registry = Arc::new(PoolRegistry::new(
        Arc::new(config),
        Arc::new(MongoDbDriver::new()),
    ));

    let outcome = match &cli.command {
        Commands::Ping(args) => commands::ping(&registry, args).await,
        Commands::Stats => commands::stats(&registry).await,
        Commands::Count(args) => commands::count(&registry, args).await,
        Commands::Find(args) => commands::find(&registry, args).await,
    };

    registry.shutdown().await;
    outcome
}
