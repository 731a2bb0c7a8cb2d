//! Admin console backend (v1)
//!
//! Serves the administrative API of the management platform and guards the
//! window in which the first administrator account must be created.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGTERM/SIGINT ──▶ ┌──────────┐
//!                      │ Shutdown │──────────────┐
//!                      └────┬─────┘              │ cancels
//!                           │ drains             ▼
//!   Client ──▶ ┌────────────┴──┐  stop()  ┌───────────────┐  has_administrator()  ┌───────────┐
//!              │  HttpServer   │─────────▶│ AdminWatchdog │──────────────────────▶│ UserStore │
//!              │ /api/users/.. │          └──────┬────────┘                       └───────────┘
//!              └───────────────┘                 │ deadline passed, no admin
//!                                                ▼
//!                                          process exit(1)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use admin_console::config::validation::validate_config;
use admin_console::config::{load_config, ConfigError, ConsoleConfig};
use admin_console::lifecycle::signals::spawn_signal_listener;
use admin_console::lifecycle::{Console, Shutdown};
use admin_console::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "admin-console")]
#[command(about = "Administrative console backend", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ConsoleConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;

    tracing::info!("admin-console v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        init_timeout_secs = config.admin.init_timeout_secs,
        persistent = config.store.data_path.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let bind_address = config.listener.bind_address.clone();
    let console = Console::bootstrap(config, shutdown)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    console.arm_watchdog()?;
    console.serve(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
