use std::collections::BTreeMap;

use async_trait::async_trait;
use fros_models::{FlaggedCounterparty, Transaction};
use serde::{Deserialize, Serialize};

use super::ContextProvider;
use crate::error::ProviderError;

/// Reputation of the receiving account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CounterpartyProfile {
    pub account: String,
    pub flagged: bool,
    pub risk_score: f64,
    pub fraud_reports: u32,
}

pub struct CounterpartyProvider {
    flagged: BTreeMap<String, FlaggedCounterparty>,
}

impl CounterpartyProvider {
    pub fn new(flagged: BTreeMap<String, FlaggedCounterparty>) -> Self {
        Self { flagged }
    }
}

#[async_trait]
impl ContextProvider for CounterpartyProvider {
    fn name(&self) -> &str {
        "counterparty"
    }

    fn subject(&self, tx: &Transaction) -> String {
        tx.destination_account.clone()
    }

    async fn fetch(&self, tx: &Transaction) -> Result<serde_json::Value, ProviderError> {
        let account = &tx.destination_account;
        let profile = match self.flagged.get(account) {
            Some(entry) => CounterpartyProfile {
                account: account.clone(),
                flagged: true,
                risk_score: entry.risk_score.clamp(0.0, 1.0),
                fraud_reports: entry.fraud_reports,
            },
            None => CounterpartyProfile {
                account: account.clone(),
                ..Default::default()
            },
        };
        serde_json::to_value(profile).map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}
