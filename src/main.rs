//! syncclip - peer-to-peer clipboard synchronization
//!
//! `syncclip serve` runs a hub; `push` and `pull` talk to one over HTTP.

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syncclip::cli::{Cli, CliHandler};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `pull` output stays clean
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("syncclip={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("syncclip v{}", syncclip::VERSION);

    let handler = CliHandler::new(cli.config)?;
    handler.handle_command(cli.command).await?;

    Ok(())
}
