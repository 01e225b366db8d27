use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use fros_models::{AgentContext, Transaction};
use serde::{Deserialize, Serialize};

use super::{fragment_as, ContextProvider};
use crate::error::ProviderError;
use crate::history::HistorySource;

/// The `behavior` fragment: an account's recent transactions, newest first.
///
/// Cached per account, so it may hold transactions dated after the one
/// being scored. Read it through [`baseline_as_of`], never directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountHistory {
    pub account: String,
    pub transactions: Vec<Transaction>,
}

/// The baseline of `tx`'s origin account as it stood just before `tx`.
/// `None` when the `behavior` fragment is absent.
pub fn baseline_as_of(ctx: &AgentContext, tx: &Transaction) -> Option<BehaviorBaseline> {
    fragment_as::<AccountHistory>(ctx, "behavior").map(|h| BehaviorBaseline::as_of(&h, tx))
}

/// Spending baseline of the originating account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BehaviorBaseline {
    pub sample_size: usize,
    /// Mean absolute amount, major units.
    pub average_amount: f64,
    pub max_amount: f64,
    /// UTC hours the account has transacted in, ascending.
    pub typical_hours: Vec<u32>,
    pub known_counterparties: Vec<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl BehaviorBaseline {
    /// Baseline from the transactions strictly earlier than `tx`.
    pub fn as_of(history: &AccountHistory, tx: &Transaction) -> Self {
        let earlier: Vec<Transaction> = history
            .transactions
            .iter()
            .filter(|past| past.id != tx.id && past.timestamp < tx.timestamp)
            .cloned()
            .collect();
        Self::from_history(&earlier)
    }

    pub fn from_history(history: &[Transaction]) -> Self {
        if history.is_empty() {
            return Self::default();
        }

        let amounts: Vec<f64> = history.iter().map(|t| t.magnitude()).collect();
        let hours: BTreeSet<u32> = history.iter().map(|t| t.timestamp.hour()).collect();
        let counterparties: BTreeSet<String> = history
            .iter()
            .map(|t| t.destination_account.clone())
            .collect();

        Self {
            sample_size: history.len(),
            average_amount: amounts.iter().sum::<f64>() / amounts.len() as f64,
            max_amount: amounts.iter().copied().fold(0.0, f64::max),
            typical_hours: hours.into_iter().collect(),
            known_counterparties: counterparties.into_iter().collect(),
            last_seen: history.iter().map(|t| t.timestamp).max(),
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.sample_size > 0
    }

    pub fn knows_counterparty(&self, account: &str) -> bool {
        self.known_counterparties.iter().any(|c| c == account)
    }

    /// True when `hour` is more than one hour away from every typical hour.
    /// Needs at least `min_samples` history entries to say anything.
    pub fn is_unusual_hour(&self, hour: u32, min_samples: usize) -> bool {
        if self.sample_size < min_samples || self.typical_hours.is_empty() {
            return false;
        }
        !self.typical_hours.iter().any(|&h| {
            let diff = (h as i32 - hour as i32).rem_euclid(24);
            diff <= 1 || diff >= 23
        })
    }
}

pub struct BehaviorProvider {
    history: Arc<dyn HistorySource>,
    limit: usize,
}

impl BehaviorProvider {
    pub fn new(history: Arc<dyn HistorySource>, limit: usize) -> Self {
        Self { history, limit }
    }
}

#[async_trait]
impl ContextProvider for BehaviorProvider {
    fn name(&self) -> &str {
        "behavior"
    }

    fn subject(&self, tx: &Transaction) -> String {
        tx.origin_account.clone()
    }

    async fn fetch(&self, tx: &Transaction) -> Result<serde_json::Value, ProviderError> {
        let transactions = self.history.recent(&tx.origin_account, self.limit).await?;
        let history = AccountHistory {
            account: tx.origin_account.clone(),
            transactions,
        };
        serde_json::to_value(history).map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}
