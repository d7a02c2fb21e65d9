//! griddev-server entry point.
//!
//! A client process starts this binary, waits for it to answer on the
//! loopback port, and then sends every drawing command to `/command`.  The
//! server exits on its own once the client has closed its last device.
//!
//! # Usage
//!
//! ```text
//! griddev-server [OPTIONS]
//!
//! Options:
//!   --port <PORT>         HTTP port [default: 8011]
//!   --no-delay            Disable Nagle's algorithm on accepted sockets
//!   --config <FILE>       Optional TOML configuration file
//!   --log-level <FILTER>  tracing filter used when RUST_LOG is unset
//!   --output-dir <DIR>    Directory for relative image file names
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | last device closed, `/quit`, or Ctrl-C               |
//! | 1    | a request could not be decoded, or startup failed    |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use griddev_server::infrastructure::storage::config::{load_config, ServerConfig};
use griddev_server::{serve, CommandRouter, HeadlessDeviceFactory};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Companion process that renders griddev drawing commands.
///
/// Flags override values from `--config`; the config file overrides the
/// built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "griddev-server",
    about = "Companion process that owns griddev rendering devices",
    version
)]
struct Cli {
    /// TCP port to listen on.
    #[arg(long, env = "GRIDDEV_PORT")]
    port: Option<u16>,

    /// Disable Nagle's algorithm on accepted connections.
    #[arg(long)]
    no_delay: bool,

    /// Path to a TOML configuration file.  A missing file is not an error.
    #[arg(long, env = "GRIDDEV_CONFIG")]
    config: Option<PathBuf>,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long)]
    log_level: Option<String>,

    /// Directory that relative image file names are resolved against.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file, if any, and applies the flags on top.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if self.no_delay {
            config.network.no_delay = true;
        }
        if let Some(level) = self.log_level {
            config.server.log_level = level;
        }
        if self.output_dir.is_some() {
            config.server.output_dir = self.output_dir;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_server_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new().context("failed to start the Tokio runtime")?;
    let exit = runtime.block_on(run(config))?;

    // Drop the runtime before exiting so blocking tasks finish their writes.
    drop(runtime);
    std::process::exit(exit);
}

async fn run(config: ServerConfig) -> anyhow::Result<i32> {
    let addr = config.network.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let factory = Arc::new(HeadlessDeviceFactory::new(config.server.output_dir.clone()));
    let router = Arc::new(CommandRouter::new(factory));

    info!(version = env!("CARGO_PKG_VERSION"), "griddev-server starting");
    let exit = serve(listener, router, config.network.no_delay).await?;
    Ok(exit.code())
}
