use async_trait::async_trait;
use chrono::{Datelike, Timelike, Weekday};
use fros_models::{AgentContext, Transaction};
use serde_json::json;

use super::{categorize_hour, Finding, Tool};
use crate::error::ToolError;
use crate::providers::baseline_as_of;

/// History entries needed before "unusual hour for this account" applies.
const MIN_SAMPLES_FOR_HOUR_PROFILE: usize = 5;

/// Time-of-day and day-of-week outliers. Hours are UTC.
pub struct TemporalAnomalyTool;

#[async_trait]
impl Tool for TemporalAnomalyTool {
    fn name(&self) -> &str {
        "temporal_anomaly"
    }

    fn description(&self) -> &str {
        "Time-of-day and day-of-week anomalies, including hours unusual for the account"
    }

    async fn analyze(&self, tx: &Transaction, ctx: &AgentContext) -> Result<Finding, ToolError> {
        let hour = tx.timestamp.hour();
        let weekend = matches!(tx.timestamp.weekday(), Weekday::Sat | Weekday::Sun);
        let mut score = 0.0;
        let mut factors = Vec::new();
        let mut notes = Vec::new();

        match hour {
            2..=5 => {
                score += 0.5;
                factors.push("suspicious_late_night_hour".to_string());
                notes.push(format!("{:02}:{:02} falls in the 02-05 window", hour, tx.timestamp.minute()));
            }
            23 | 0 | 1 => {
                score += 0.3;
                factors.push("late_night_hour".to_string());
                notes.push(format!("late-night hour {hour:02}"));
            }
            6 | 7 => {
                score += 0.2;
                factors.push("early_morning_hour".to_string());
                notes.push(format!("early-morning hour {hour:02}"));
            }
            _ => {}
        }

        if weekend && (2..=6).contains(&hour) {
            score += 0.2;
            factors.push("weekend_suspicious_hour".to_string());
            notes.push("weekend small hours".to_string());
        }

        let baseline = baseline_as_of(ctx, tx);
        let unusual = baseline
            .as_ref()
            .is_some_and(|b| b.is_unusual_hour(hour, MIN_SAMPLES_FOR_HOUR_PROFILE));
        if unusual {
            score += 0.3;
            factors.push("unusual_hour_for_account".to_string());
            notes.push("outside the account's usual hours".to_string());
        }

        let period = categorize_hour(hour);
        let rationale = if notes.is_empty() {
            format!("Timing is unremarkable ({period})")
        } else {
            format!("Timing risk: {}", notes.join("; "))
        };

        Ok(Finding::new(f64::min(score, 1.0), rationale)
            .with_factors(factors)
            .with_details(json!({
                "hour": hour,
                "period": period,
                "is_weekend": weekend,
                "unusual_for_account": unusual,
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{behavior_fragment, context_with, tx_at};
    use chrono::{TimeZone, Utc};

    /// Twelve earlier purchases spread over `hours`.
    fn habitual(tx: &Transaction, hours: &[u32]) -> serde_json::Value {
        let past: Vec<(i64, &str, u32)> = (0..12).map(|i| (1_000, "shop", hours[i % hours.len()])).collect();
        behavior_fragment(tx, &past)
    }

    #[tokio::test]
    async fn business_hours_weekday_is_zero() {
        // 2026-03-04 is a Wednesday.
        let tx = tx_at("t", 100, Utc.with_ymd_and_hms(2026, 3, 4, 14, 0, 0).unwrap(), "a", "b");
        let ctx = context_with(&tx, &[("behavior", habitual(&tx, &[13, 14, 15]))]);
        let f = TemporalAnomalyTool.analyze(&tx, &ctx).await.unwrap();
        assert_eq!(f.contribution, 0.0);
        assert_eq!(f.details["period"], "business_hours");
    }

    #[tokio::test]
    async fn late_night_and_unusual_for_account() {
        let tx = tx_at("t", 100, Utc.with_ymd_and_hms(2026, 3, 4, 3, 45, 0).unwrap(), "a", "b");
        let ctx = context_with(&tx, &[("behavior", habitual(&tx, &[13, 14, 15]))]);
        let f = TemporalAnomalyTool.analyze(&tx, &ctx).await.unwrap();
        assert!((f.contribution - 0.8).abs() < 1e-9);
        assert!(f.rationale.contains("03:45"));
        assert_eq!(
            f.risk_factors,
            vec!["suspicious_late_night_hour", "unusual_hour_for_account"]
        );
    }

    #[tokio::test]
    async fn weekend_small_hours_stack() {
        // 2026-03-07 is a Saturday.
        let tx = tx_at("t", 100, Utc.with_ymd_and_hms(2026, 3, 7, 4, 0, 0).unwrap(), "a", "b");
        let f = TemporalAnomalyTool
            .analyze(&tx, &context_with(&tx, &[]))
            .await
            .unwrap();
        assert!((f.contribution - 0.7).abs() < 1e-9);
        assert_eq!(f.details["is_weekend"], true);
    }

    #[tokio::test]
    async fn hour_profile_ignores_later_history() {
        let tx = tx_at("t", 100, Utc.with_ymd_and_hms(2026, 3, 4, 14, 0, 0).unwrap(), "a", "b");
        // Habits only established after the transaction.
        let later: Vec<Transaction> = (1..=12)
            .map(|d| tx_at(&format!("l{d}"), 100, Utc.with_ymd_and_hms(2026, 3, 5 + d / 4, 3, d, 0).unwrap(), "a", "b"))
            .collect();
        let history = serde_json::to_value(crate::providers::AccountHistory {
            account: "a".to_string(),
            transactions: later,
        })
        .unwrap();
        let f = TemporalAnomalyTool
            .analyze(&tx, &context_with(&tx, &[("behavior", history)]))
            .await
            .unwrap();
        assert_eq!(f.details["unusual_for_account"], false);
        assert_eq!(f.contribution, 0.0);
    }
}
