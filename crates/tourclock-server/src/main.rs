//! # tourclock
//!
//! Live tournament clock synchronization server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tourclock
//!
//! # Run with a specific config file
//! tourclock --config /path/to/tourclock.toml
//!
//! # Run with environment variables
//! TOURCLOCK_PORT=3002 TOURCLOCK_HOST=0.0.0.0 tourclock
//! ```

use anyhow::{bail, Result};
use std::path::PathBuf;
use tourclock_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourclock=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match config_path()? {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    tracing::info!("Starting tourclock server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}

/// Parse `--config <path>` from the command line.
fn config_path() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(p) => path = Some(PathBuf::from(shellexpand::tilde(&p).as_ref())),
                None => bail!("--config requires a path"),
            },
            other => bail!("Unknown argument: {other}"),
        }
    }

    Ok(path)
}
