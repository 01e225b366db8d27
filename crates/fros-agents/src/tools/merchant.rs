use async_trait::async_trait;
use fros_models::{AgentContext, Transaction};
use serde_json::json;

use super::{Finding, Tool};
use crate::error::ToolError;
use crate::providers::{fragment_as, CounterpartyProfile, PatternMatch};

pub struct MerchantRiskTool;

#[async_trait]
impl Tool for MerchantRiskTool {
    fn name(&self) -> &str {
        "merchant_risk"
    }

    fn description(&self) -> &str {
        "Merchant category risk, counterparty reputation, and known fraud signatures"
    }

    async fn analyze(&self, _tx: &Transaction, ctx: &AgentContext) -> Result<Finding, ToolError> {
        let patterns: Option<PatternMatch> = fragment_as(ctx, "patterns");
        let counterparty: Option<CounterpartyProfile> = fragment_as(ctx, "counterparty");
        if patterns.is_none() && counterparty.is_none() {
            return Err(ToolError::NoSignal(
                "No pattern or counterparty data; merchant risk not assessed".to_string(),
            ));
        }

        let category_risk = patterns.as_ref().and_then(|p| p.category_risk).unwrap_or(0.0);
        let reputation = counterparty
            .as_ref()
            .filter(|c| c.flagged)
            .map(|c| c.risk_score)
            .unwrap_or(0.0);

        let mut score = category_risk.max(reputation) * 0.6;
        let mut factors = Vec::new();
        let mut notes = Vec::new();

        if category_risk >= 0.5 {
            factors.push("high_risk_merchant_category".to_string());
        }
        if let Some(category) = patterns.as_ref().and_then(|p| p.merchant_category.as_deref()) {
            if category_risk > 0.0 {
                notes.push(format!("category {category} carries risk {category_risk:.2}"));
            }
        }
        if let Some(c) = counterparty.as_ref().filter(|c| c.flagged) {
            factors.push("flagged_counterparty".to_string());
            notes.push(format!("{} is flagged (risk {:.2})", c.account, c.risk_score));
            if c.fraud_reports > 5 {
                score += 0.3;
                factors.push("multiple_fraud_reports".to_string());
                notes.push(format!("{} fraud reports", c.fraud_reports));
            }
        }
        if patterns.as_ref().is_some_and(|p| p.has("structuring")) {
            score += 0.3;
            factors.push("structuring_pattern".to_string());
            notes.push("just below the reporting threshold".to_string());
        }

        let rationale = if notes.is_empty() {
            "No merchant or counterparty risk indicators".to_string()
        } else {
            format!("Merchant risk: {}", notes.join("; "))
        };

        Ok(Finding::new(f64::min(score, 1.0), rationale)
            .with_factors(factors)
            .with_details(json!({
                "category": patterns.as_ref().and_then(|p| p.merchant_category.clone()),
                "category_risk": category_risk,
                "counterparty_flagged": counterparty.as_ref().is_some_and(|c| c.flagged),
                "signatures": patterns.map(|p| p.signatures).unwrap_or_default(),
            })))
    }
}
