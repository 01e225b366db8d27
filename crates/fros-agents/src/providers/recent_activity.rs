use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fros_models::Transaction;
use serde::{Deserialize, Serialize};

use super::ContextProvider;
use crate::error::ProviderError;
use crate::history::HistorySource;

/// The account's transactions in the sliding window ending at the current
/// transaction. The current transaction itself is not included.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecentActivity {
    pub window_seconds: u64,
    pub count: usize,
    /// Minor units, newest first.
    pub amounts: Vec<i64>,
    pub counterparties: Vec<String>,
}

impl RecentActivity {
    pub fn distinct_counterparties(&self) -> usize {
        self.counterparties.iter().collect::<BTreeSet<_>>().len()
    }
}

pub struct RecentActivityProvider {
    history: Arc<dyn HistorySource>,
    window: Duration,
    limit: usize,
}

impl RecentActivityProvider {
    pub fn new(history: Arc<dyn HistorySource>, window: Duration, limit: usize) -> Self {
        Self {
            history,
            window,
            limit,
        }
    }
}

#[async_trait]
impl ContextProvider for RecentActivityProvider {
    fn name(&self) -> &str {
        "recent_activity"
    }

    fn subject(&self, tx: &Transaction) -> String {
        tx.origin_account.clone()
    }

    async fn fetch(&self, tx: &Transaction) -> Result<serde_json::Value, ProviderError> {
        let window = chrono::Duration::from_std(self.window)
            .map_err(|e| ProviderError::Unavailable(format!("window out of range: {e}")))?;
        let since = tx.timestamp - window;

        let in_window: Vec<Transaction> = self
            .history
            .recent(&tx.origin_account, self.limit)
            .await?
            .into_iter()
            .filter(|past| past.id != tx.id && past.timestamp >= since && past.timestamp <= tx.timestamp)
            .collect();

        let activity = RecentActivity {
            window_seconds: self.window.as_secs(),
            count: in_window.len(),
            amounts: in_window.iter().map(|t| t.amount).collect(),
            counterparties: in_window
                .iter()
                .map(|t| t.destination_account.clone())
                .collect(),
        };

        serde_json::to_value(activity).map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tx_at, StaticHistory};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    #[tokio::test]
    async fn only_counts_transactions_inside_window() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let history = StaticHistory::default().with(vec![
            tx_at("a", 2_000, now - ChronoDuration::seconds(30), "acct-1", "p1"),
            tx_at("b", 2_000, now - ChronoDuration::seconds(200), "acct-1", "p2"),
            tx_at("c", 2_000, now - ChronoDuration::minutes(30), "acct-1", "p3"),
            tx_at("d", 2_000, now + ChronoDuration::seconds(5), "acct-1", "p4"),
        ]);
        let provider =
            RecentActivityProvider::new(Arc::new(history), Duration::from_secs(300), 100);

        let value = provider
            .fetch(&tx_at("now", 2_000, now, "acct-1", "p5"))
            .await
            .unwrap();
        let activity: RecentActivity = serde_json::from_value(value).unwrap();

        assert_eq!(activity.count, 2);
        assert_eq!(activity.window_seconds, 300);
        assert_eq!(activity.distinct_counterparties(), 2);
        assert_eq!(activity.amounts, vec![2_000, 2_000]);
    }
}
