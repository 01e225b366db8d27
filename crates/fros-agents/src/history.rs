use std::sync::Arc;

use async_trait::async_trait;
use fros_models::Transaction;
use fros_store::ExecutionLedger;

use crate::error::ProviderError;

/// Where account history comes from. Providers that derive baselines read
/// through this seam so the same provider works against the ledger, the
/// banking system, or a fixture.
#[async_trait]
pub trait HistorySource: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `limit` past transactions originated by `account`, newest first.
    async fn recent(&self, account: &str, limit: usize) -> Result<Vec<Transaction>, ProviderError>;
}

/// History read back from the Execution Ledger.
pub struct LedgerHistory {
    ledger: Arc<dyn ExecutionLedger>,
}

impl LedgerHistory {
    pub fn new(ledger: Arc<dyn ExecutionLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl HistorySource for LedgerHistory {
    fn name(&self) -> &str {
        "ledger"
    }

    async fn recent(&self, account: &str, limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        let ledger = Arc::clone(&self.ledger);
        let account = account.to_string();
        // SQLite reads are blocking.
        tokio::task::spawn_blocking(move || ledger.history_for_account(&account, limit))
            .await
            .map_err(|e| ProviderError::Unavailable(format!("ledger read task failed: {e}")))?
            .map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}
