use std::collections::BTreeSet;

use async_trait::async_trait;
use fros_models::{AgentContext, Transaction};
use serde_json::json;

use super::{Finding, Tool};
use crate::error::ToolError;
use crate::providers::{fragment_as, RecentActivity};

/// Frequency of transactions inside the sliding window.
pub struct VelocityTool;

#[async_trait]
impl Tool for VelocityTool {
    fn name(&self) -> &str {
        "velocity"
    }

    fn description(&self) -> &str {
        "Transaction frequency within a sliding window, fan-out to many counterparties, repeated amounts"
    }

    async fn analyze(&self, tx: &Transaction, ctx: &AgentContext) -> Result<Finding, ToolError> {
        let Some(activity) = fragment_as::<RecentActivity>(ctx, "recent_activity") else {
            return Err(ToolError::NoSignal(
                "No recent-activity data; velocity not assessed".to_string(),
            ));
        };

        // The burst includes the transaction under analysis.
        let burst = activity.count + 1;
        let mut counterparties: BTreeSet<&str> =
            activity.counterparties.iter().map(String::as_str).collect();
        counterparties.insert(tx.destination_account.as_str());
        let all_equal = activity.amounts.iter().all(|&a| a == tx.amount);

        let mut score = 0.0;
        let mut factors = Vec::new();
        let mut notes = Vec::new();

        if burst > 10 {
            score += 0.6;
            factors.push("extreme_velocity".to_string());
        } else if burst >= 5 {
            score += 0.5;
            factors.push("high_velocity".to_string());
        } else if burst >= 3 {
            score += 0.2;
            factors.push("elevated_velocity".to_string());
        }
        if burst >= 3 {
            notes.push(format!(
                "{burst} transactions within {} s",
                activity.window_seconds
            ));
        }

        if burst >= 3 && counterparties.len() == burst {
            score += 0.25;
            factors.push("fan_out_counterparties".to_string());
            notes.push(format!("{} distinct counterparties", counterparties.len()));
        }
        if burst >= 3 && all_equal {
            score += 0.25;
            factors.push("repeated_equal_amounts".to_string());
            notes.push(format!("all for {}", tx.amount_major()));
        }

        let rationale = if notes.is_empty() {
            format!("Normal velocity ({burst} in window)")
        } else {
            format!("Velocity risk: {}", notes.join("; "))
        };

        Ok(Finding::new(f64::min(score, 1.0), rationale)
            .with_factors(factors)
            .with_details(json!({
                "window_seconds": activity.window_seconds,
                "transactions_in_window": burst,
                "distinct_counterparties": counterparties.len(),
                "equal_amounts": all_equal && burst >= 3,
            })))
    }
}
