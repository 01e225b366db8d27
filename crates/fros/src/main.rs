use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fros::models::Transaction;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fros", about = "Fraud Risk Orchestration System")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/fros.toml", global = true)]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score one transaction and print the decision
    Analyze {
        /// Read Transaction JSON from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Print the stored execution record for a transaction
    Audit {
        transaction_id: String,
    },
    /// List the analysis tools enabled by the configuration
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = fros::load_config(&cli.config)?;

    let output = match cli.command {
        Command::Analyze { input } => {
            let raw = if let Some(path) = &input {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read input: {path}"))?
            } else {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read from stdin")?;
                buf
            };
            let tx: Transaction =
                serde_json::from_str(&raw).context("Failed to parse Transaction JSON")?;

            let orchestrator =
                fros::build_orchestrator(&config).context("Failed to build orchestrator")?;
            let shutdown = CancellationToken::new();
            let sweeper = fros::spawn_cache_sweeper(
                orchestrator.cache().clone(),
                std::time::Duration::from_secs(config.cache.sweep_interval_seconds.max(1)),
                shutdown.clone(),
            );

            let evaluation = fros::evaluate(&orchestrator, tx)
                .await
                .map_err(|e| anyhow::anyhow!("Evaluation failed: {e}"))?;
            if evaluation.is_duplicate() {
                info!(
                    transaction_id = %evaluation.decision().transaction_id,
                    "Transaction was already scored; printing the recorded decision"
                );
            }

            shutdown.cancel();
            let _ = sweeper.await;
            to_json(evaluation.decision(), cli.pretty)?
        }
        Command::Audit { transaction_id } => {
            if config.ledger.sqlite_path.is_none() {
                bail!("Audit needs a durable ledger: set [ledger] sqlite_path in {}", cli.config);
            }
            let orchestrator =
                fros::build_orchestrator(&config).context("Failed to build orchestrator")?;
            let record = orchestrator
                .record(&transaction_id)
                .map_err(|e| anyhow::anyhow!("Ledger lookup failed: {e}"))?
                .with_context(|| format!("No execution record for {transaction_id}"))?;
            to_json(&record, cli.pretty)?
        }
        Command::Tools => {
            let registry = fros::agents::ToolRegistry::standard(&config);
            let catalog: Vec<serde_json::Value> = registry
                .catalog()
                .into_iter()
                .map(|(name, description)| {
                    serde_json::json!({
                        "timeout_ms": registry.get(&name).map(|t| t.timeout.as_millis() as u64),
                        "weight": config.synthesis.weight_for(&name),
                        "name": name,
                        "description": description,
                    })
                })
                .collect();
            to_json(&catalog, cli.pretty)?
        }
    };

    // Output JSON to stdout
    println!("{output}");
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}
