use async_trait::async_trait;
use fros_models::{AgentContext, Transaction};
use serde_json::json;

use super::{categorize_amount, Finding, Tool};
use crate::error::ToolError;
use crate::providers::baseline_as_of;

/// Scores the amount on its own and against the account's baseline.
pub struct AmountDeviationTool;

#[async_trait]
impl Tool for AmountDeviationTool {
    fn name(&self) -> &str {
        "amount_deviation"
    }

    fn description(&self) -> &str {
        "Amount size and deviation from the account's historical average"
    }

    async fn analyze(&self, tx: &Transaction, ctx: &AgentContext) -> Result<Finding, ToolError> {
        let amount = tx.magnitude();
        let minor = tx.amount.unsigned_abs();
        let mut score = 0.0;
        let mut factors = Vec::new();
        let mut notes = Vec::new();

        if amount > 5_000.0 {
            score += 0.7;
            factors.push("very_large_amount".to_string());
            notes.push(format!("amount {} exceeds 5000", tx.amount_major()));
        } else if amount > 2_000.0 {
            score += 0.4;
            factors.push("large_amount".to_string());
            notes.push(format!("amount {} exceeds 2000", tx.amount_major()));
        }

        // Without a baseline only the amount itself is scored.
        let baseline = baseline_as_of(ctx, tx);
        let mut ratio = None;
        if let Some(b) = baseline.as_ref().filter(|b| b.has_baseline() && b.average_amount > 0.0) {
            let r = amount / b.average_amount;
            ratio = Some(r);
            if r > 10.0 {
                score += 0.5;
                factors.push("extreme_amount_deviation".to_string());
                notes.push(format!("{r:.1}x the account average of {:.2}", b.average_amount));
            } else if r > 5.0 {
                score += 0.3;
                factors.push("high_amount_deviation".to_string());
                notes.push(format!("{r:.1}x the account average of {:.2}", b.average_amount));
            }
        }

        if minor >= 100_000 && minor % 10_000 == 0 {
            score += 0.2;
            factors.push("round_amount".to_string());
            notes.push("round amount".to_string());
        }
        if minor < 100 {
            score += 0.15;
            factors.push("micro_amount".to_string());
            notes.push("micro amount typical of card testing".to_string());
        }

        let category = categorize_amount(amount);
        let rationale = if notes.is_empty() {
            format!("Amount {} is within normal range ({category})", tx.amount_major())
        } else {
            format!("Amount risk: {}", notes.join("; "))
        };

        Ok(Finding::new(f64::min(score, 1.0), rationale)
            .with_factors(factors)
            .with_details(json!({
                "amount": amount,
                "category": category,
                "baseline_ratio": ratio,
                "baseline_available": baseline.is_some_and(|b| b.has_baseline()),
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{behavior_fragment, context_with, tx_at};
    use chrono::Utc;

    #[tokio::test]
    async fn small_familiar_amount_is_quiet() {
        let tx = tx_at("t", 450, Utc::now(), "a", "b");
        let ctx = context_with(&tx, &[("behavior", behavior_fragment(&tx, &[(500, "b", 12); 10]))]);
        let f = AmountDeviationTool.analyze(&tx, &ctx).await.unwrap();
        assert_eq!(f.contribution, 0.0);
        assert!(f.risk_factors.is_empty());
        assert_eq!(f.details["category"], "micro");
        assert_eq!(f.details["baseline_available"], true);
    }

    #[tokio::test]
    async fn large_round_deviating_amount_saturates() {
        let tx = tx_at("t", 250_000, Utc::now(), "a", "b");
        let ctx = context_with(&tx, &[("behavior", behavior_fragment(&tx, &[(5_000, "b", 12); 10]))]);
        let f = AmountDeviationTool.analyze(&tx, &ctx).await.unwrap();
        assert_eq!(f.contribution, 1.0);
        assert!(f.risk_factors.contains(&"large_amount".to_string()));
        assert!(f.risk_factors.contains(&"extreme_amount_deviation".to_string()));
        assert!(f.risk_factors.contains(&"round_amount".to_string()));
        assert!(f.rationale.contains("2500.00"));
    }

    #[tokio::test]
    async fn missing_baseline_scores_the_amount_alone() {
        let tx = tx_at("t", 300_000, Utc::now(), "a", "b");
        let ctx = context_with(&tx, &[]);
        let f = AmountDeviationTool.analyze(&tx, &ctx).await.unwrap();
        // large (0.4) + round (0.2), no deviation term
        assert!((f.contribution - 0.6).abs() < 1e-9);
        assert_eq!(f.details["baseline_available"], false);
    }

    #[tokio::test]
    async fn later_spending_does_not_lift_the_average() {
        let tx = tx_at("t", 250_000, Utc::now() - chrono::Duration::days(30), "a", "b");
        let later = tx_at("later", 5_000_000, Utc::now(), "a", "b");
        let history = serde_json::to_value(crate::providers::AccountHistory {
            account: "a".to_string(),
            transactions: vec![later],
        })
        .unwrap();
        let ctx = context_with(&tx, &[("behavior", history)]);
        let f = AmountDeviationTool.analyze(&tx, &ctx).await.unwrap();
        assert_eq!(f.details["baseline_available"], false);
        assert!(f.details["baseline_ratio"].is_null());
    }

    #[tokio::test]
    async fn micro_amount_flagged() {
        let tx = tx_at("t", 50, Utc::now(), "a", "b");
        let f = AmountDeviationTool
            .analyze(&tx, &context_with(&tx, &[]))
            .await
            .unwrap();
        assert!((f.contribution - 0.15).abs() < 1e-9);
        assert_eq!(f.risk_factors, vec!["micro_amount"]);
    }
}
