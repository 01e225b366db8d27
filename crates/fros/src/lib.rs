//! FROS - Fraud Risk Orchestration System
//!
//! Scores financial transactions by gathering context from independent
//! providers, running analysis tools in parallel, and synthesising a single
//! explainable decision, either through an external reasoning backend or a
//! deterministic weighted fallback.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use fros::models::{FrosConfig, Transaction};
//! use fros::agents::{Evaluation, Orchestrator};
//!
//! # async fn run(tx: Transaction) -> anyhow::Result<()> {
//! let config = FrosConfig::default();
//! let orchestrator = fros::build_orchestrator(&config)?;
//! let evaluation = fros::evaluate(&orchestrator, tx).await?;
//! println!("{}", evaluation.decision().tier);
//! # Ok(())
//! # }
//! ```

pub use fros_agents as agents;
pub use fros_models as models;
pub use fros_store as store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use fros_agents::{
    standard_providers, BankApiClient, ClaudeCliBackend, Evaluation, HistorySource,
    LedgerHistory, Orchestrator, OrchestratorError, ReasoningBackend, Synthesizer, ToolRegistry,
};
use fros_models::{FrosConfig, SynthesisMode, Transaction};
use fros_store::{ContextCache, ExecutionLedger, MemoryLedger, SqliteLedger};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Read and parse a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<FrosConfig, anyhow::Error> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: FrosConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok(config)
}

/// Build an Orchestrator from configuration.
pub fn build_orchestrator(config: &FrosConfig) -> Result<Arc<Orchestrator>, anyhow::Error> {
    if !config.synthesis.thresholds.is_valid() {
        bail!(
            "Invalid tier thresholds: review={} block={}",
            config.synthesis.thresholds.review,
            config.synthesis.thresholds.block
        );
    }

    let ledger: Arc<dyn ExecutionLedger> = match &config.ledger.sqlite_path {
        Some(path) => Arc::new(
            SqliteLedger::open(path)
                .with_context(|| format!("Failed to open ledger: {path}"))?,
        ),
        None => Arc::new(MemoryLedger::new()),
    };

    let history: Arc<dyn HistorySource> = match &config.bank {
        Some(bank) => Arc::new(
            BankApiClient::new(bank).context("Failed to build bank API client")?,
        ),
        None => Arc::new(LedgerHistory::new(Arc::clone(&ledger))),
    };

    let backend: Option<Arc<dyn ReasoningBackend>> = match config.synthesis.mode {
        SynthesisMode::Backend => Some(Arc::new(ClaudeCliBackend::new(
            config.synthesis.model.clone(),
            config.orchestrator.synthesis_timeout(),
        ))),
        SynthesisMode::FallbackOnly => None,
    };

    let providers = standard_providers(config, history);
    let tools = ToolRegistry::standard(config);
    info!(
        providers = providers.len(),
        tools = tools.len(),
        ledger = if config.ledger.sqlite_path.is_some() { "sqlite" } else { "memory" },
        history = if config.bank.is_some() { "bank" } else { "ledger" },
        mode = ?config.synthesis.mode,
        "Orchestrator configured"
    );

    let synthesizer = Synthesizer::new(
        backend,
        config.synthesis.clone(),
        config.orchestrator.synthesis_timeout(),
    );

    Ok(Arc::new(Orchestrator::new(
        providers,
        tools,
        synthesizer,
        Arc::new(ContextCache::new(config.cache.max_capacity)),
        ledger,
        config.orchestrator.clone(),
    )))
}

/// Evaluate a transaction using the given orchestrator.
pub async fn evaluate(
    orchestrator: &Orchestrator,
    tx: Transaction,
) -> Result<Evaluation, OrchestratorError> {
    orchestrator.evaluate(tx).await
}

/// Periodically evict expired context fragments until `shutdown` fires.
pub fn spawn_cache_sweeper(
    cache: Arc<ContextCache>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    cache.sweep().await;
                    debug!(entries = cache.entry_count(), "Context cache swept");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fros_agents::test_support::tx_at;
    use fros_models::RiskTier;

    fn offline() -> FrosConfig {
        let mut config = FrosConfig::default();
        config.synthesis.mode = SynthesisMode::FallbackOnly;
        config
    }

    #[test]
    fn sample_config_parses() {
        let config: FrosConfig = toml::from_str(include_str!("../../../config/fros.toml")).unwrap();
        assert_eq!(config.tools.len(), 5);
        assert!(config.synthesis.thresholds.is_valid());
        assert_eq!(config.provider("recent_activity").unwrap().cache_ttl_seconds, 0);
        assert!(config.reference.home_locations.contains_key("acct-1001"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: FrosConfig = toml::from_str("").unwrap();
        assert_eq!(config, FrosConfig::default());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = offline();
        config.synthesis.thresholds.review = 0.9;
        config.synthesis.thresholds.block = 0.1;
        assert!(build_orchestrator(&config).is_err());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config("/nonexistent/fros.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[tokio::test]
    async fn sqlite_ledger_survives_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline();
        config.ledger.sqlite_path = Some(dir.path().join("ledger.db").to_string_lossy().into_owned());

        let tx = tx_at(
            "tx-1",
            250_000,
            Utc.with_ymd_and_hms(2026, 3, 4, 3, 45, 0).unwrap(),
            "acct-1",
            "stranger",
        );
        let first = {
            let orch = build_orchestrator(&config).unwrap();
            evaluate(&orch, tx.clone()).await.unwrap().into_decision()
        };

        let orch = build_orchestrator(&config).unwrap();
        let stored = orch.record("tx-1").unwrap().unwrap();
        assert_eq!(stored.decision.id, first.id);
        assert!(evaluate(&orch, tx).await.unwrap().is_duplicate());
    }

    #[tokio::test]
    async fn fallback_only_engine_scores_without_backend() {
        let orch = build_orchestrator(&offline()).unwrap();
        let decision = evaluate(
            &orch,
            tx_at("tx-2", 450, Utc.with_ymd_and_hms(2026, 3, 4, 14, 0, 0).unwrap(), "a", "b"),
        )
        .await
        .unwrap()
        .into_decision();
        assert!(decision.is_fallback());
        assert_eq!(decision.tier, RiskTier::Low);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let token = CancellationToken::new();
        let handle = spawn_cache_sweeper(
            Arc::new(ContextCache::new(10)),
            Duration::from_millis(10),
            token.clone(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
