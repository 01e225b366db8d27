use async_trait::async_trait;
use fros_models::{AgentContext, Transaction};
use serde_json::json;

use super::{Finding, Tool};
use crate::error::ToolError;
use crate::providers::{baseline_as_of, fragment_as, GeoAssessment};

const INTERNATIONAL_KM: f64 = 5_000.0;
const LONG_DISTANCE_KM: f64 = 1_000.0;

/// Counterparty familiarity and geographic distance from home.
pub struct CounterpartyGeoTool;

#[async_trait]
impl Tool for CounterpartyGeoTool {
    fn name(&self) -> &str {
        "counterparty_geo"
    }

    fn description(&self) -> &str {
        "Unfamiliar counterparties, distance from the account's home location, and high-risk countries"
    }

    async fn analyze(&self, tx: &Transaction, ctx: &AgentContext) -> Result<Finding, ToolError> {
        let baseline = baseline_as_of(ctx, tx);
        let geo: Option<GeoAssessment> = fragment_as(ctx, "geolocation");
        if baseline.is_none() && geo.is_none() {
            return Err(ToolError::NoSignal(
                "No behavior or geolocation data; counterparty and location not assessed".to_string(),
            ));
        }

        let mut score = 0.0;
        let mut factors = Vec::new();
        let mut notes = Vec::new();

        let familiar = baseline
            .as_ref()
            .filter(|b| b.has_baseline())
            .map(|b| b.knows_counterparty(&tx.destination_account));
        if familiar == Some(false) {
            score += 0.3;
            factors.push("unfamiliar_counterparty".to_string());
            notes.push(format!("first payment to {}", tx.destination_account));
        }

        let distance = geo.as_ref().and_then(|g| g.distance_km);
        if let Some(km) = distance {
            if km > INTERNATIONAL_KM {
                score += 0.4;
                factors.push("international_distance".to_string());
                notes.push(format!("{km:.0} km from home"));
            } else if km > LONG_DISTANCE_KM {
                score += 0.2;
                factors.push("long_distance".to_string());
                notes.push(format!("{km:.0} km from home"));
            }
        }
        if let Some(g) = geo.as_ref().filter(|g| g.high_risk_country) {
            score += 0.6;
            factors.push("high_risk_country".to_string());
            notes.push(format!(
                "initiated from high-risk country {}",
                g.country.as_deref().unwrap_or("?")
            ));
        }

        let rationale = if notes.is_empty() {
            "Counterparty and location are consistent with history".to_string()
        } else {
            format!("Counterparty/geo risk: {}", notes.join("; "))
        };

        Ok(Finding::new(f64::min(score, 1.0), rationale)
            .with_factors(factors)
            .with_details(json!({
                "familiar_counterparty": familiar,
                "distance_km": distance,
                "country": geo.as_ref().and_then(|g| g.country.clone()),
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{behavior_fragment, context_with, tx_at};
    use chrono::Utc;
    use fros_models::GeoPoint;

    fn knows(tx: &Transaction, accounts: &[&str]) -> serde_json::Value {
        let past: Vec<(i64, &str, u32)> = accounts.iter().map(|a| (1_000, *a, 12)).collect();
        behavior_fragment(tx, &past)
    }

    fn far(km_country: (f64, &str, bool)) -> serde_json::Value {
        serde_json::to_value(GeoAssessment {
            reported: Some(GeoPoint::new(0.0, 0.0, Some(km_country.1))),
            distance_km: Some(km_country.0),
            country: Some(km_country.1.to_string()),
            high_risk_country: km_country.2,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn familiar_nearby_is_zero() {
        let tx = tx_at("t", 100, Utc::now(), "a", "shop-1");
        let ctx = context_with(&tx, &[("behavior", knows(&tx, &["shop-1"])), ("geolocation", far((3.0, "US", false)))]);
        let f = CounterpartyGeoTool.analyze(&tx, &ctx).await.unwrap();
        assert_eq!(f.contribution, 0.0);
        assert_eq!(f.details["familiar_counterparty"], true);
    }

    #[tokio::test]
    async fn unfamiliar_and_distant() {
        let tx = tx_at("t", 100, Utc::now(), "a", "stranger");
        let ctx = context_with(&tx, &[("behavior", knows(&tx, &["shop-1"])), ("geolocation", far((8_400.0, "NG", false)))]);
        let f = CounterpartyGeoTool.analyze(&tx, &ctx).await.unwrap();
        assert!((f.contribution - 0.7).abs() < 1e-9);
        assert_eq!(f.risk_factors, vec!["unfamiliar_counterparty", "international_distance"]);
    }

    #[tokio::test]
    async fn high_risk_country_saturates() {
        let tx = tx_at("t", 100, Utc::now(), "a", "stranger");
        let ctx = context_with(&tx, &[("behavior", knows(&tx, &["shop-1"])), ("geolocation", far((6_000.0, "KP", true)))]);
        let f = CounterpartyGeoTool.analyze(&tx, &ctx).await.unwrap();
        assert_eq!(f.contribution, 1.0);
    }

    #[tokio::test]
    async fn no_context_means_no_signal() {
        let tx = tx_at("t", 100, Utc::now(), "a", "stranger");
        let err = CounterpartyGeoTool
            .analyze(&tx, &context_with(&tx, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NoSignal(_)));
    }

    #[tokio::test]
    async fn geolocation_alone_still_scores() {
        let tx = tx_at("t", 100, Utc::now(), "a", "stranger");
        let ctx = context_with(&tx, &[("geolocation", far((8_400.0, "NG", false)))]);
        let f = CounterpartyGeoTool.analyze(&tx, &ctx).await.unwrap();
        assert!((f.contribution - 0.4).abs() < 1e-9);
        assert!(f.details["familiar_counterparty"].is_null());
    }
}
