use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clipboard::{ClipboardBackend, ClipboardWatcher, MemoryClipboard, SystemClipboard};
use crate::config::Config;
use crate::server;
use crate::sync::{Connector, Hub};
use crate::transport::websocket::WebSocketDialer;
use crate::transport::Dialer;

pub mod client;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TARGET"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "syncclip")]
#[command(about = "Peer-to-peer clipboard synchronization")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    after_help = "Without a subcommand, piped stdin is pushed to the hub; otherwise the hub's clipboard is printed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Run the sync hub")]
    Serve {
        /// Keep the clipboard in memory instead of using the desktop clipboard
        #[arg(long)]
        headless: bool,
    },

    #[command(about = "Send stdin to the hub's clipboard")]
    Push,

    #[command(about = "Print the hub's clipboard")]
    Pull,
}

pub struct CliHandler {
    config: Config,
}

impl CliHandler {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = Config::load(config_path.as_deref())
            .context("Failed to load configuration")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn handle_command(&self, command: Option<Commands>) -> Result<()> {
        match command {
            Some(Commands::Serve { headless }) => self.serve(headless).await,
            Some(Commands::Push) => self.push().await,
            Some(Commands::Pull) => self.pull().await,
            None if std::io::stdin().is_terminal() => self.pull().await,
            None => self.push().await,
        }
    }

    async fn serve(&self, headless: bool) -> Result<()> {
        let clipboard: Arc<dyn ClipboardBackend> = if headless {
            Arc::new(MemoryClipboard::new())
        } else {
            Arc::new(SystemClipboard::new().context("Failed to initialize clipboard")?)
        };
        info!("Using {} clipboard", clipboard.name());

        let shutdown = CancellationToken::new();
        let hub = Hub::spawn(clipboard, self.config.hub_config(), shutdown.clone());
        info!("Hub identity: {}", hub.id());

        // A headless hub only changes through peers and POSTs
        let watchers = if headless {
            Vec::new()
        } else {
            ClipboardWatcher::new(hub.clone())
                .with_poll_interval(self.config.poll_interval())
                .start(&shutdown)
        };

        let dialer: Arc<dyn Dialer> = Arc::new(WebSocketDialer::default());
        for peer in &self.config.peers {
            let connector = Connector::new(hub.clone(), Arc::clone(&dialer), peer.clone())
                .with_retry_delay(self.config.retry_delay());
            tokio::spawn(connector.run(shutdown.clone()));
        }

        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received interrupt, shutting down");
                    signal.cancel();
                }
                Err(e) => warn!("Cannot listen for interrupt: {}", e),
            }
        });

        let served = server::serve(hub, &self.config.listen_addr(), shutdown.clone()).await;
        shutdown.cancel();
        for watcher in watchers {
            let _ = watcher.await;
        }

        served.context("Server failed")
    }

    async fn push(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let sent = client::push(&self.config.url, stdin).await?;
        info!("Pushed {} bytes to {}", sent, self.config.url);
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        let stdout = tokio::io::stdout();
        client::pull(&self.config.url, stdout).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from(["syncclip", "serve", "--headless", "-c", "/tmp/x.toml"]);
        assert_eq!(cli.command, Some(Commands::Serve { headless: true }));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::parse_from(["syncclip", "-v"]);
        assert!(cli.command.is_none());
        assert!(cli.verbose);
    }

    #[test]
    fn test_handler_uses_explicit_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "url = \"9000\"\n").unwrap();

        let handler = CliHandler::new(Some(path)).unwrap();
        assert_eq!(handler.config().url, "http://localhost:9000");
    }
}
