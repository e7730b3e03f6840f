//! `hausflow`: home-automation gateway.
//!
//! Loads configuration (file, then `HAUSFLOW__*` environment overrides),
//! sets up logging, starts the gateway and runs until ctrl-c.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use hausflow_bridge::Gateway;
use hausflow_core::config::ConfigBuilder;
use hausflow_core::logging;

/// Bridges beacon-relayed and networked home devices to a smart-home assistant.
#[derive(Parser, Debug)]
#[command(name = "hausflow", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "HAUSFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overriding the configured level (e.g. `debug` or `hausflow_devices=trace`)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = ConfigBuilder::new().with_environment_prefix("HAUSFLOW");
    if let Some(path) = &cli.config {
        builder = builder.with_config_file(path);
    }
    let mut config = builder.build().context("failed to load configuration")?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json_logs {
        config.logging.json_format = true;
    }
    logging::init_from_config(&config.logging).context("failed to initialize logging")?;
    hausflow_bridge::init()?;

    let gateway = Gateway::start(&config)
        .await
        .context("failed to start gateway")?;
    info!("{} running, press ctrl-c to stop", config.general.app_name);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    gateway.shutdown();

    Ok(())
}
