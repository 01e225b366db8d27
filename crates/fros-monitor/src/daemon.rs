use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fros_agents::{BankApiClient, Orchestrator, OrchestratorError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::MonitorError;

/// Counts from one polling pass over every configured account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub submitted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub unreachable_accounts: usize,
}

/// The monitor daemon. Polls the banking system for new outgoing
/// transactions, scores each one once, and keeps the context cache swept.
pub struct Monitor {
    config: MonitorConfig,
    orchestrator: Arc<Orchestrator>,
    bank: BankApiClient,
    sweep_interval: Duration,
    /// Ids already submitted, with their transaction time.
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    cancel: CancellationToken,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        orchestrator: Arc<Orchestrator>,
        sweep_interval: Duration,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let bank = BankApiClient::new(&config.bank)?;
        Ok(Self {
            config,
            orchestrator,
            bank,
            sweep_interval,
            seen: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled.
    pub async fn run(self: Arc<Self>) -> Result<(), MonitorError> {
        info!(accounts = self.config.accounts.len(), "FROS monitor starting");

        let mut join_set = tokio::task::JoinSet::new();

        {
            let monitor = Arc::clone(&self);
            join_set.spawn(async move {
                monitor.poll_loop().await;
            });
        }

        {
            let sweeper = fros::spawn_cache_sweeper(
                Arc::clone(self.orchestrator.cache()),
                self.sweep_interval,
                self.cancel.clone(),
            );
            join_set.spawn(async move {
                if let Err(e) = sweeper.await {
                    error!(error = %e, "Cache sweeper task failed");
                }
            });
        }

        info!("All monitor tasks started");

        // Both tasks run until cancelled
        while join_set.join_next().await.is_some() {}

        info!("FROS monitor stopped");
        Ok(())
    }

    async fn poll_loop(&self) {
        let interval = Duration::from_secs(self.config.poll_interval_seconds);

        loop {
            let summary = self.poll_once().await;
            if summary.submitted > 0 || summary.unreachable_accounts > 0 {
                info!(
                    fetched = summary.fetched,
                    submitted = summary.submitted,
                    duplicates = summary.duplicates,
                    failed = summary.failed,
                    unreachable = summary.unreachable_accounts,
                    "Poll complete"
                );
            } else {
                debug!(fetched = summary.fetched, "Poll complete, nothing new");
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Poll loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One pass over every account. Outgoing transactions not seen before are
    /// scored oldest first so each one's history includes its predecessors.
    pub async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();

        for account in &self.config.accounts {
            if self.cancel.is_cancelled() {
                break;
            }

            let mut fresh = match self.bank.transactions_for(account).await {
                Ok(txs) => txs,
                Err(e) => {
                    warn!(account = %account, error = %e, "Failed to fetch transactions");
                    summary.unreachable_accounts += 1;
                    continue;
                }
            };
            summary.fetched += fresh.len();

            fresh.retain(|tx| tx.origin_account == *account && self.mark_seen(&tx.id, tx.timestamp));
            fresh.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

            for tx in fresh {
                let id = tx.id.clone();
                let submission = self.orchestrator.submit(tx);
                let request = submission.cancellation_token();

                let outcome = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        request.cancel();
                        self.forget(&id);
                        return summary;
                    }
                    outcome = submission.wait() => outcome,
                };

                match outcome {
                    Ok(evaluation) if evaluation.is_duplicate() => summary.duplicates += 1,
                    Ok(evaluation) => {
                        summary.submitted += 1;
                        let decision = evaluation.decision();
                        info!(
                            transaction_id = %id,
                            score = decision.score,
                            action = %decision.action,
                            "Transaction scored"
                        );
                    }
                    Err(OrchestratorError::Rejected(reason)) => {
                        warn!(transaction_id = %id, reason = %reason, "Bank record rejected");
                        summary.failed += 1;
                    }
                    Err(e) => {
                        // Retry on the next poll.
                        error!(transaction_id = %id, error = %e, "Scoring failed");
                        self.forget(&id);
                        summary.failed += 1;
                    }
                }
            }
        }

        self.prune_seen();
        summary
    }

    /// True when `id` had not been seen before.
    fn mark_seen(&self, id: &str, timestamp: DateTime<Utc>) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(id.to_string(), timestamp).is_none(),
            Err(e) => {
                // The ledger still deduplicates.
                error!(error = %e, "Seen-set lock poisoned");
                true
            }
        }
    }

    /// Forget ids older than the retention window behind the newest one.
    fn prune_seen(&self) {
        let Ok(mut seen) = self.seen.lock() else {
            return;
        };
        let Some(newest) = seen.values().max().copied() else {
            return;
        };
        let secs = i64::try_from(self.config.seen_retention_seconds)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        let Some(cutoff) = newest.checked_sub_signed(chrono::Duration::seconds(secs)) else {
            return;
        };
        let before = seen.len();
        seen.retain(|_, ts| *ts >= cutoff);
        if seen.len() < before {
            debug!(forgotten = before - seen.len(), remembered = seen.len(), "Pruned seen transactions");
        }
    }

    fn forget(&self, id: &str) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.remove(id);
        }
    }
}
