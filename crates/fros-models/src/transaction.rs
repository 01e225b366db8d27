use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geographic point, either reported with a transaction or known as an account's home.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// ISO 3166 alpha-2 country code, when known.
    #[serde(default)]
    pub country: Option<String>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, country: Option<&str>) -> Self {
        Self {
            latitude,
            longitude,
            country: country.map(|c| c.to_string()),
        }
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Optional metadata the caller can attach to a transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransactionMetadata {
    pub merchant: Option<String>,
    /// Merchant category (e.g., "grocery", "electronics", "gambling").
    pub merchant_category: Option<String>,
    /// Where the transaction was initiated.
    pub location: Option<GeoPoint>,
    /// Any additional key-value metadata.
    pub extra: Option<serde_json::Value>,
}

/// A financial transaction submitted for fraud scoring.
///
/// Immutable once admitted: the orchestrator only ever hands out shared references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Unique identifier. Re-submitting an identifier returns the first decision.
    pub id: String,
    /// Signed amount in minor units (cents).
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
    pub origin_account: String,
    pub destination_account: String,
    #[serde(default)]
    pub metadata: Option<TransactionMetadata>,
}

impl Transaction {
    /// Amount in major units, exact.
    pub fn amount_major(&self) -> Decimal {
        Decimal::new(self.amount, 2)
    }

    /// Absolute amount in major units as a float, for scoring rules.
    pub fn magnitude(&self) -> f64 {
        self.amount.unsigned_abs() as f64 / 100.0
    }

    pub fn merchant_category(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.merchant_category.as_deref())
    }

    pub fn location(&self) -> Option<&GeoPoint> {
        self.metadata.as_ref().and_then(|m| m.location.as_ref())
    }

    /// Structural checks performed on admission.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("transaction id is empty".to_string());
        }
        if self.origin_account.trim().is_empty() {
            return Err("origin account is empty".to_string());
        }
        if self.destination_account.trim().is_empty() {
            return Err("destination account is empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample() -> Transaction {
        Transaction {
            id: "tx-1001".to_string(),
            amount: 250_000,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 3, 45, 0).unwrap(),
            origin_account: "1011226111".to_string(),
            destination_account: "9099791699".to_string(),
            metadata: Some(TransactionMetadata {
                merchant: Some("Acme Electronics".to_string()),
                merchant_category: Some("electronics".to_string()),
                location: Some(GeoPoint::new(51.5074, -0.1278, Some("GB"))),
                extra: None,
            }),
        }
    }

    #[test]
    fn amount_conversions() {
        let tx = sample();
        assert_eq!(tx.amount_major(), dec!(2500.00));
        assert_eq!(tx.magnitude(), 2500.0);

        let refund = Transaction {
            amount: -450,
            ..sample()
        };
        assert_eq!(refund.amount_major(), dec!(-4.50));
        assert_eq!(refund.magnitude(), 4.5);
    }

    #[test]
    fn metadata_accessors() {
        let tx = sample();
        assert_eq!(tx.merchant_category(), Some("electronics"));
        assert_eq!(tx.location().unwrap().country.as_deref(), Some("GB"));

        let bare = Transaction {
            metadata: None,
            ..sample()
        };
        assert!(bare.merchant_category().is_none());
        assert!(bare.location().is_none());
    }

    #[test]
    fn haversine_distance() {
        let new_york = GeoPoint::new(40.7128, -74.0060, Some("US"));
        let london = GeoPoint::new(51.5074, -0.1278, Some("GB"));
        let d = new_york.distance_km(&london);
        assert!((d - 5570.0).abs() < 30.0, "got {d}");
        assert!(new_york.distance_km(&new_york) < 1e-9);
    }

    #[test]
    fn validate_rejects_blank_fields() {
        assert!(sample().validate().is_ok());
        let blank_id = Transaction {
            id: "  ".to_string(),
            ..sample()
        };
        assert!(blank_id.validate().is_err());
        let blank_dest = Transaction {
            destination_account: String::new(),
            ..sample()
        };
        assert!(blank_dest.validate().is_err());
    }

    #[test]
    fn deserialize_without_metadata() {
        let json = r#"{
            "id": "tx-7",
            "amount": 450,
            "timestamp": "2026-03-04T14:10:00Z",
            "origin_account": "1011226111",
            "destination_account": "1033623433"
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.amount, 450);
        assert!(tx.metadata.is_none());
    }
}
