use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fros_models::FrosConfig;
use tracing_subscriber::EnvFilter;

use fros_monitor::config::MonitorConfig;
use fros_monitor::daemon::Monitor;

#[derive(Parser, Debug)]
#[command(
    name = "fros-monitor",
    about = "FROS monitor daemon - scores new transactions read from the banking system"
)]
struct Cli {
    /// Path to monitor configuration file
    #[arg(short, long, default_value = "config/monitor.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: MonitorConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse monitor config")?;

    let engine: FrosConfig = match &config.engine_config {
        Some(path) => fros::load_config(path)?,
        None => FrosConfig::default(),
    };
    let sweep_interval = Duration::from_secs(engine.cache.sweep_interval_seconds.max(1));
    let orchestrator =
        fros::build_orchestrator(&engine).context("Failed to build orchestrator")?;

    let monitor = Arc::new(
        Monitor::new(config, orchestrator, sweep_interval)
            .map_err(|e| anyhow::anyhow!("Invalid monitor config: {e}"))?,
    );
    let cancel = monitor.cancel_token();

    // Handle shutdown signals
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    monitor
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Monitor error: {e}"))?;

    Ok(())
}
