use std::collections::BTreeMap;

use async_trait::async_trait;
use fros_models::Transaction;
use serde::{Deserialize, Serialize};

use super::ContextProvider;
use crate::error::ProviderError;

/// Fraction of the reporting threshold at which "just below" starts.
const STRUCTURING_BAND: f64 = 0.9;

/// Known fraud signatures matched by the transaction's shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternMatch {
    pub signatures: Vec<String>,
    pub merchant_category: Option<String>,
    /// Reference risk for the merchant category, when the category is known.
    pub category_risk: Option<f64>,
}

impl PatternMatch {
    pub fn has(&self, signature: &str) -> bool {
        self.signatures.iter().any(|s| s == signature)
    }
}

pub struct PatternProvider {
    category_risk: BTreeMap<String, f64>,
    reporting_threshold_minor: i64,
}

impl PatternProvider {
    pub fn new(category_risk: BTreeMap<String, f64>, reporting_threshold_minor: i64) -> Self {
        Self {
            category_risk,
            reporting_threshold_minor,
        }
    }

    fn signatures(&self, tx: &Transaction) -> Vec<String> {
        let mut out = Vec::new();
        let minor = tx.amount.unsigned_abs() as i64;

        if minor < 100 {
            out.push("card_testing".to_string());
        }
        if minor >= 100_000 && minor % 10_000 == 0 {
            out.push("round_amount".to_string());
        }
        let threshold = self.reporting_threshold_minor;
        if threshold > 0
            && minor < threshold
            && minor as f64 >= threshold as f64 * STRUCTURING_BAND
        {
            out.push("structuring".to_string());
        }
        out
    }
}

#[async_trait]
impl ContextProvider for PatternProvider {
    fn name(&self) -> &str {
        "patterns"
    }

    fn subject(&self, tx: &Transaction) -> String {
        format!(
            "{}:{}",
            tx.amount,
            tx.merchant_category().unwrap_or("uncategorized")
        )
    }

    async fn fetch(&self, tx: &Transaction) -> Result<serde_json::Value, ProviderError> {
        let merchant_category = tx.merchant_category().map(|c| c.to_ascii_lowercase());
        let category_risk = merchant_category
            .as_deref()
            .and_then(|c| self.category_risk.get(c).copied());

        let matched = PatternMatch {
            signatures: self.signatures(tx),
            merchant_category,
            category_risk,
        };
        serde_json::to_value(matched).map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}
